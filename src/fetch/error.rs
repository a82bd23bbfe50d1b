//! Error types for the fetch module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for fetch operations
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request exceeded its timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Proxy/rendering service error or misconfiguration
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// Invalid block-signature pattern
    #[error("Block pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Filesystem error writing fetched content
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<FetchError> for CrateError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Http(e) => CrateError::Http(e),
            FetchError::Io(e) => CrateError::Io(e),
            _ => CrateError::Fetch(err.to_string()),
        }
    }
}
