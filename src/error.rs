//! Error types for the sitepipe crate

use thiserror::Error;

/// Result type for sitepipe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for sitepipe operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error; run-fatal
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sitemap discovery error
    #[error("Discovery error: {0}")]
    Discover(String),

    /// Page fetch error
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Content processing error
    #[error("Process error: {0}")]
    Process(String),

    /// Vector indexing error
    #[error("Index error: {0}")]
    Index(String),

    /// Metadata store error
    #[error("Metadata store error: {0}")]
    Store(String),

    /// Run was cancelled
    #[error("Run cancelled")]
    Cancelled,

    /// Other errors
    #[error("{0}")]
    Other(String),
}
