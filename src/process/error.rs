//! Error types for the processor module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for content processing operations
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Extraction backend error
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Boilerplate removal error
    #[error("Cleaning error: {0}")]
    Cleaning(String),

    /// Q&A generation backend error
    #[error("Q&A generation error: {0}")]
    Qa(String),

    /// Record references content that is not on disk
    #[error("Missing content: {0}")]
    MissingContent(String),

    /// Invalid Q&A URL pattern
    #[error("Q&A pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// Metadata store error
    #[error("Metadata store error: {0}")]
    Store(String),

    /// Worker task error
    #[error("Task error: {0}")]
    Task(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<ProcessError> for CrateError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Io(e) => CrateError::Io(e),
            ProcessError::Json(e) => CrateError::Json(e),
            _ => CrateError::Process(err.to_string()),
        }
    }
}

impl From<crate::metadata::StoreError> for ProcessError {
    fn from(err: crate::metadata::StoreError) -> Self {
        ProcessError::Store(err.to_string())
    }
}
