//! Error types for the indexer module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for indexing operations
#[derive(Debug, Error)]
pub enum IndexError {
    /// HTTP client error talking to the vector service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem error reading processed content
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Embedding backend error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Upsert failed after exhausting retries
    #[error("Upsert error: {0}")]
    Upsert(String),

    /// Record is not ready for indexing
    #[error("Missing processed content: {0}")]
    MissingProcessed(String),

    /// Metadata store error
    #[error("Metadata store error: {0}")]
    Store(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<IndexError> for CrateError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Http(e) => CrateError::Http(e),
            IndexError::Io(e) => CrateError::Io(e),
            IndexError::Json(e) => CrateError::Json(e),
            _ => CrateError::Index(err.to_string()),
        }
    }
}

impl From<crate::metadata::StoreError> for IndexError {
    fn from(err: crate::metadata::StoreError) -> Self {
        IndexError::Store(err.to_string())
    }
}
