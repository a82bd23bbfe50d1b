//! Indexer module
//!
//! This module turns processed content into bounded chunks, requests
//! embeddings, and upserts the result into the external vector store in
//! fixed-size batches with retry. Chunk ordinals are deterministic and
//! upserts replace by key, so repeated runs converge to the same index
//! content instead of duplicating it.

pub mod backend;
mod chunker;
mod error;

pub use backend::{IndexPoint, RestVectorStore, VectorServiceConfig, VectorStore};
pub use chunker::{TextChunker, estimate_tokens};
pub use error::IndexError;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::cache::LookupCache;
use crate::config::IndexerConfig;
use crate::metadata::{IndexStatus, MetadataStore, PageType, UrlRecord};
use crate::process::{ProcessedDocument, ProductRecord};

/// Derived, transient unit of indexing; never persisted outside the index
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub source_url: String,

    /// Stable position within the source record
    pub ordinal: usize,

    pub text: String,
    pub token_estimate: usize,

    /// "product", "document" or "answer"
    pub chunk_type: String,

    /// Extra payload carried into the index (title, Q&A answer)
    pub metadata: Value,
}

/// Counts for one indexing run
#[derive(Debug, Default, Clone, Serialize)]
pub struct IndexReport {
    pub records: usize,
    pub chunks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Chunks for a processed document: text chunks first, then one
/// question-chunk per Q&A pair carrying its answer as metadata
pub fn document_chunks(chunker: &TextChunker, doc: &ProcessedDocument) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for text in chunker.chunk_text(&doc.clean_text) {
        chunks.push(Chunk {
            source_url: doc.url.clone(),
            ordinal: chunks.len(),
            token_estimate: estimate_tokens(&text),
            text,
            chunk_type: "document".to_string(),
            metadata: json!({ "title": doc.title }),
        });
    }
    for pair in &doc.qa {
        chunks.push(Chunk {
            source_url: doc.url.clone(),
            ordinal: chunks.len(),
            token_estimate: estimate_tokens(&pair.question),
            text: pair.question.clone(),
            chunk_type: "answer".to_string(),
            metadata: json!({ "title": doc.title, "answer": pair.answer }),
        });
    }
    chunks
}

/// Chunks for an extracted product, over its deterministic text rendering
pub fn product_chunks(chunker: &TextChunker, url: &str, product: &ProductRecord) -> Vec<Chunk> {
    let rendered = product.render_text();
    let title = product.title.clone().unwrap_or_default();
    chunker
        .chunk_text(&rendered)
        .into_iter()
        .enumerate()
        .map(|(ordinal, text)| Chunk {
            source_url: url.to_string(),
            ordinal,
            token_estimate: estimate_tokens(&text),
            text,
            chunk_type: "product".to_string(),
            metadata: json!({ "title": title }),
        })
        .collect()
}

/// Index every processed record not yet marked Indexed
#[instrument(skip_all, fields(site_dir = %site_dir.display()))]
pub async fn run_index(
    store: Arc<MetadataStore>,
    vector_store: Arc<dyn VectorStore>,
    cache: Arc<dyn LookupCache>,
    config: &IndexerConfig,
    site_dir: &Path,
    cancel: watch::Receiver<bool>,
) -> Result<IndexReport, IndexError> {
    let chunker = TextChunker::from_config(config);
    let pending = store.records_where(|r| {
        r.processed_path.is_some() && r.index_status != IndexStatus::Indexed
    });
    info!("Indexing {} records", pending.len());

    let mut report = IndexReport {
        records: pending.len(),
        ..IndexReport::default()
    };
    for record in pending {
        if *cancel.borrow() {
            report.cancelled += 1;
            continue;
        }
        match index_record(&*vector_store, &*cache, &chunker, config, site_dir, &record).await {
            Ok(count) => {
                store.set_index_status(&record.url, IndexStatus::Indexed)?;
                report.chunks += count;
                report.succeeded += 1;
            }
            Err(e) => {
                error!("Failed to index {}: {}", record.url, e);
                store.set_index_status(&record.url, IndexStatus::IndexFailed)?;
                report.failed += 1;
            }
        }
    }

    if let Err(e) = store.save().await {
        warn!("Failed to persist metadata: {}", e);
    }
    info!(
        "Indexing finished: {} records, {} chunks, {} failed",
        report.succeeded, report.chunks, report.failed
    );
    Ok(report)
}

async fn index_record(
    vector_store: &dyn VectorStore,
    cache: &dyn LookupCache,
    chunker: &TextChunker,
    config: &IndexerConfig,
    site_dir: &Path,
    record: &UrlRecord,
) -> Result<usize, IndexError> {
    let rel = record
        .processed_path
        .as_deref()
        .ok_or_else(|| IndexError::MissingProcessed(record.url.clone()))?;
    let text = tokio::fs::read_to_string(site_dir.join(rel)).await?;

    let chunks = match record.page_type {
        PageType::Product => {
            let product: ProductRecord = serde_json::from_str(&text)?;
            product_chunks(chunker, &record.url, &product)
        }
        PageType::Document | PageType::Unknown => {
            let doc: ProcessedDocument = serde_json::from_str(&text)?;
            document_chunks(chunker, &doc)
        }
    };
    if chunks.is_empty() {
        return Ok(0);
    }

    let vectors = embed_chunks(vector_store, cache, config, &chunks).await?;

    let points = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| {
            let mut metadata = match &chunk.metadata {
                Value::Object(map) => map.clone(),
                _ => serde_json::Map::new(),
            };
            metadata.insert("url".to_string(), json!(chunk.source_url));
            metadata.insert("position".to_string(), json!(chunk.ordinal));
            metadata.insert("chunk_type".to_string(), json!(chunk.chunk_type));
            metadata.insert("text".to_string(), json!(chunk.text));
            IndexPoint {
                id: format!("{}#{}", chunk.source_url, chunk.ordinal),
                vector,
                metadata: Value::Object(metadata),
            }
        })
        .collect::<Vec<_>>();

    for batch in points.chunks(config.batch_size) {
        let mut attempt = 0;
        loop {
            match vector_store.upsert(batch).await {
                Ok(()) => break,
                Err(e) => {
                    attempt += 1;
                    if attempt >= config.max_retries {
                        return Err(e);
                    }
                    let delay = config.backoff.delay(attempt);
                    warn!(
                        "Upsert attempt {} for {} failed: {}; retrying in {:?}",
                        attempt, record.url, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Ok(points.len())
}

/// Embed all chunk texts, going through the lookup cache and batching the
/// misses
async fn embed_chunks(
    vector_store: &dyn VectorStore,
    cache: &dyn LookupCache,
    config: &IndexerConfig,
    chunks: &[Chunk],
) -> Result<Vec<Vec<f32>>, IndexError> {
    let mut vectors: Vec<Option<Vec<f32>>> = vec![None; chunks.len()];
    let mut missing_positions = Vec::new();
    let mut missing_texts = Vec::new();

    for (position, chunk) in chunks.iter().enumerate() {
        let key = format!("embed:{}", chunk.text);
        if let Some(cached) = cache.get(&key).await {
            if let Ok(vector) = serde_json::from_str(&cached) {
                vectors[position] = Some(vector);
                continue;
            }
        }
        missing_positions.push(position);
        missing_texts.push(chunk.text.clone());
    }

    for (batch_number, batch) in missing_texts.chunks(config.batch_size).enumerate() {
        let mut attempt = 0;
        let embedded = loop {
            match vector_store.embed(batch).await {
                Ok(embedded) => break embedded,
                Err(e) => {
                    attempt += 1;
                    if attempt >= config.max_retries {
                        return Err(e);
                    }
                    let delay = config.backoff.delay(attempt);
                    warn!(
                        "Embed attempt {} failed: {}; retrying in {:?}",
                        attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };
        if embedded.len() != batch.len() {
            return Err(IndexError::Embedding(format!(
                "{} embeddings returned for {} texts",
                embedded.len(),
                batch.len()
            )));
        }
        for (offset, vector) in embedded.into_iter().enumerate() {
            let position = missing_positions[batch_number * config.batch_size + offset];
            cache
                .set(
                    &format!("embed:{}", chunks[position].text),
                    serde_json::to_string(&vector)?,
                )
                .await;
            vectors[position] = Some(vector);
        }
    }

    vectors
        .into_iter()
        .map(|v| v.ok_or_else(|| IndexError::Embedding("missing vector".to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::BackoffPolicy;
    use crate::metadata::DiscoveredUrl;
    use crate::process::QaPair;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubVectorStore {
        embed_calls: AtomicUsize,
        upsert_calls: AtomicUsize,
        fail_first_upserts: usize,
        points: Mutex<Vec<IndexPoint>>,
    }

    impl StubVectorStore {
        fn new() -> Self {
            Self::failing(0)
        }

        fn failing(fail_first_upserts: usize) -> Self {
            Self {
                embed_calls: AtomicUsize::new(0),
                upsert_calls: AtomicUsize::new(0),
                fail_first_upserts,
                points: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VectorStore for StubVectorStore {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
            self.embed_calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }

        async fn upsert(&self, points: &[IndexPoint]) -> Result<(), IndexError> {
            let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first_upserts {
                return Err(IndexError::Upsert("unavailable".to_string()));
            }
            self.points.lock().unwrap().extend_from_slice(points);
            Ok(())
        }
    }

    fn quick_config() -> IndexerConfig {
        IndexerConfig {
            chunk_max_tokens: 16,
            batch_size: 4,
            max_retries: 3,
            backoff: BackoffPolicy::Fixed { delay_ms: 1 },
            ..IndexerConfig::default()
        }
    }

    fn cancel_rx() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    async fn processed_site() -> (tempfile::TempDir, Arc<MetadataStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::load(dir.path().join("pages_metadata.json"))
            .await
            .unwrap();

        let urls = [
            ("https://shop.example.com/products/chair", PageType::Product),
            ("https://shop.example.com/pages/faq", PageType::Document),
        ];
        let candidates: Vec<DiscoveredUrl> = urls
            .iter()
            .map(|(url, page_type)| DiscoveredUrl {
                url: url.to_string(),
                last_modified: None,
                priority: None,
                changefreq: None,
                page_type: *page_type,
            })
            .collect();
        store.merge_discovered(&candidates);

        let product = ProductRecord {
            title: Some("Sugoi Chair".to_string()),
            price: Some("129.99".to_string()),
            ..ProductRecord::default()
        };
        let doc = ProcessedDocument {
            url: "https://shop.example.com/pages/faq".to_string(),
            title: "FAQ".to_string(),
            clean_text: "Shipping takes three to five business days. Returns are accepted \
                         within thirty days."
                .to_string(),
            qa: vec![QaPair {
                question: "How long does shipping take?".to_string(),
                answer: "3-5 business days.".to_string(),
            }],
        };

        for (url, raw_rel, processed_rel, json) in [
            (
                "https://shop.example.com/products/chair",
                "html/products/chair",
                "products/chair.json",
                serde_json::to_string_pretty(&product).unwrap(),
            ),
            (
                "https://shop.example.com/pages/faq",
                "html/pages/faq",
                "documents/pages/faq.json",
                serde_json::to_string_pretty(&doc).unwrap(),
            ),
        ] {
            store.record_success(url, raw_rel, 1).unwrap();
            let full = dir.path().join(processed_rel);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(&full, json).unwrap();
            store.set_processed(url, processed_rel).unwrap();
        }

        (dir, Arc::new(store))
    }

    #[tokio::test]
    async fn test_run_index_marks_records_indexed() {
        let (dir, store) = processed_site().await;
        let vector_store = Arc::new(StubVectorStore::new());

        let report = run_index(
            store.clone(),
            vector_store.clone(),
            Arc::new(MemoryCache::new()),
            &quick_config(),
            dir.path(),
            cancel_rx(),
        )
        .await
        .unwrap();

        assert_eq!(report.records, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);
        assert!(report.chunks >= 3);

        for url in ["https://shop.example.com/products/chair", "https://shop.example.com/pages/faq"] {
            assert_eq!(store.get(url).unwrap().index_status, IndexStatus::Indexed);
        }

        let points = vector_store.points.lock().unwrap().clone();
        let answer_point = points
            .iter()
            .find(|p| p.metadata["chunk_type"] == "answer")
            .expect("QA question chunk should be indexed");
        assert_eq!(answer_point.metadata["answer"], "3-5 business days.");
        assert_eq!(answer_point.metadata["title"], "FAQ");

        // No chunk spans source URLs and ids are keyed by url + ordinal.
        for point in &points {
            let url = point.metadata["url"].as_str().unwrap();
            assert!(point.id.starts_with(&format!("{}#", url)));
        }
    }

    #[tokio::test]
    async fn test_reindexing_is_idempotent_and_deterministic() {
        let (dir, store) = processed_site().await;
        let config = quick_config();

        let first = Arc::new(StubVectorStore::new());
        run_index(
            store.clone(),
            first.clone(),
            Arc::new(MemoryCache::new()),
            &config,
            dir.path(),
            cancel_rx(),
        )
        .await
        .unwrap();
        let first_ids: HashSet<String> = first
            .points
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.id.clone())
            .collect();

        // A second run with nothing new indexes nothing.
        let report = run_index(
            store.clone(),
            first.clone(),
            Arc::new(MemoryCache::new()),
            &config,
            dir.path(),
            cancel_rx(),
        )
        .await
        .unwrap();
        assert_eq!(report.records, 0);

        // A forced re-index recomputes identical ids, so the upsert
        // replaces rather than duplicates.
        for url in ["https://shop.example.com/products/chair", "https://shop.example.com/pages/faq"] {
            store.set_index_status(url, IndexStatus::NotIndexed).unwrap();
        }
        let second = Arc::new(StubVectorStore::new());
        run_index(
            store.clone(),
            second.clone(),
            Arc::new(MemoryCache::new()),
            &config,
            dir.path(),
            cancel_rx(),
        )
        .await
        .unwrap();
        let second_ids: HashSet<String> = second
            .points
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.id.clone())
            .collect();
        assert_eq!(first_ids, second_ids);
    }

    #[tokio::test]
    async fn test_upsert_retries_then_succeeds() {
        let (dir, store) = processed_site().await;
        let vector_store = Arc::new(StubVectorStore::failing(2));

        let report = run_index(
            store.clone(),
            vector_store.clone(),
            Arc::new(MemoryCache::new()),
            &quick_config(),
            dir.path(),
            cancel_rx(),
        )
        .await
        .unwrap();

        assert_eq!(report.failed, 0);
        assert!(vector_store.upsert_calls.load(Ordering::SeqCst) > 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_mark_index_failed() {
        let (dir, store) = processed_site().await;
        // Fails far more often than the retry budget of any record.
        let vector_store = Arc::new(StubVectorStore::failing(usize::MAX));

        let report = run_index(
            store.clone(),
            vector_store,
            Arc::new(MemoryCache::new()),
            &quick_config(),
            dir.path(),
            cancel_rx(),
        )
        .await
        .unwrap();

        assert_eq!(report.failed, 2);
        for url in ["https://shop.example.com/products/chair", "https://shop.example.com/pages/faq"] {
            assert_eq!(
                store.get(url).unwrap().index_status,
                IndexStatus::IndexFailed
            );
        }
    }

    #[tokio::test]
    async fn test_embeddings_are_memoised_through_the_cache() {
        let (dir, store) = processed_site().await;
        let cache = Arc::new(MemoryCache::new());
        let config = quick_config();

        let first = Arc::new(StubVectorStore::new());
        run_index(
            store.clone(),
            first.clone(),
            cache.clone(),
            &config,
            dir.path(),
            cancel_rx(),
        )
        .await
        .unwrap();
        assert!(first.embed_calls.load(Ordering::SeqCst) > 0);

        for url in ["https://shop.example.com/products/chair", "https://shop.example.com/pages/faq"] {
            store.set_index_status(url, IndexStatus::NotIndexed).unwrap();
        }
        let second = Arc::new(StubVectorStore::new());
        run_index(store, second.clone(), cache, &config, dir.path(), cancel_rx())
            .await
            .unwrap();
        assert_eq!(second.embed_calls.load(Ordering::SeqCst), 0);
        assert!(!second.points.lock().unwrap().is_empty());
    }

    #[test]
    fn test_document_chunks_order_text_then_qa() {
        let chunker = TextChunker::new(vec![". ".to_string()], 8);
        let doc = ProcessedDocument {
            url: "https://example.com/faq".to_string(),
            title: "FAQ".to_string(),
            clean_text: "First fact here. Second fact here.".to_string(),
            qa: vec![QaPair {
                question: "A question?".to_string(),
                answer: "An answer.".to_string(),
            }],
        };

        let chunks = document_chunks(&chunker, &doc);
        assert!(chunks.len() >= 2);
        let ordinals: Vec<usize> = chunks.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, (0..chunks.len()).collect::<Vec<_>>());
        assert_eq!(chunks.last().unwrap().chunk_type, "answer");
        for chunk in &chunks {
            assert!(chunk.token_estimate <= 8);
            assert_eq!(chunk.source_url, "https://example.com/faq");
        }
    }
}
