//! Vector store backend: the capability the indexer pushes chunks through.
//!
//! `RestVectorStore` is the default implementation, speaking to an
//! OpenAI-compatible embeddings endpoint and a points-upsert endpoint over
//! plain HTTP. Anything else plugs in through the `VectorStore` trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::error::IndexError;

/// One embeddable record keyed for idempotent upserts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexPoint {
    /// Stable id, `{url}#{ordinal}`; upserts replace by this key
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Value,
}

/// Capability for embedding text and upserting points
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed a batch of texts, one vector per input in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError>;

    /// Insert-or-replace a batch of points by id
    async fn upsert(&self, points: &[IndexPoint]) -> Result<(), IndexError>;
}

/// Endpoints and credentials for the REST vector service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorServiceConfig {
    /// OpenAI-compatible embeddings endpoint
    pub embed_endpoint: String,

    /// Points upsert endpoint
    pub upsert_endpoint: String,

    pub api_key: String,

    /// Embedding model identifier
    pub model: String,

    #[serde(default)]
    pub dimensions: Option<usize>,
}

/// HTTP vector store client
pub struct RestVectorStore {
    client: reqwest::Client,
    config: VectorServiceConfig,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    points: &'a [IndexPoint],
}

impl RestVectorStore {
    pub fn new(config: VectorServiceConfig) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl VectorStore for RestVectorStore {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self.config.dimensions,
        };
        let response = self
            .client
            .post(&self.config.embed_endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Embedding(format!("HTTP {}: {}", status, body)));
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != texts.len() {
            return Err(IndexError::Embedding(format!(
                "service returned {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        debug!("Embedded {} texts", texts.len());
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }

    async fn upsert(&self, points: &[IndexPoint]) -> Result<(), IndexError> {
        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(&self.config.upsert_endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&UpsertRequest { points })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Upsert(format!("HTTP {}: {}", status, body)));
        }
        debug!("Upserted {} points", points.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serde_json::json;

    fn service_config(server: &Server) -> VectorServiceConfig {
        VectorServiceConfig {
            embed_endpoint: format!("{}/embeddings", server.url()),
            upsert_endpoint: format!("{}/points", server.url()),
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
            dimensions: None,
        }
    }

    #[tokio::test]
    async fn test_embed_preserves_input_order() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(
                json!({
                    "data": [
                        {"embedding": [0.2], "index": 1},
                        {"embedding": [0.1], "index": 0}
                    ]
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let store = RestVectorStore::new(service_config(&server)).unwrap();
        let vectors = store
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![0.1], vec![0.2]]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_embed_count_mismatch_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_body(json!({"data": [{"embedding": [0.1], "index": 0}]}).to_string())
            .create_async()
            .await;

        let store = RestVectorStore::new(service_config(&server)).unwrap();
        let result = store
            .embed(&["first".to_string(), "second".to_string()])
            .await;
        assert!(matches!(result, Err(IndexError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_upsert_failure_reports_status() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", "/points")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let store = RestVectorStore::new(service_config(&server)).unwrap();
        let point = IndexPoint {
            id: "https://example.com/a#0".to_string(),
            vector: vec![0.1],
            metadata: json!({"url": "https://example.com/a"}),
        };
        let result = store.upsert(&[point]).await;
        match result {
            Err(IndexError::Upsert(message)) => assert!(message.contains("503")),
            other => panic!("expected upsert error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_empty_batches_are_no_ops() {
        let server = Server::new_async().await;
        let store = RestVectorStore::new(service_config(&server)).unwrap();
        assert!(store.embed(&[]).await.unwrap().is_empty());
        store.upsert(&[]).await.unwrap();
    }
}
