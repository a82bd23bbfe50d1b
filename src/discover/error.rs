//! Error types for the discovery module

use crate::error::Error as CrateError;
use crate::fetch::FetchError;
use thiserror::Error;

/// Error type for sitemap discovery operations
#[derive(Debug, Error)]
pub enum DiscoverError {
    /// Fetcher backend error
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// XML reader error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// XML deserialization error
    #[error("XML deserialization error: {0}")]
    Deserialize(#[from] quick_xml::errors::serialize::DeError),

    /// Document is not a sitemap
    #[error("Malformed sitemap: {0}")]
    Malformed(String),

    /// Invalid sitemap allow pattern
    #[error("Allow pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// robots.txt yielded no parseable sitemap
    #[error("No sitemaps discovered: {0}")]
    NoSitemaps(String),

    /// Metadata store error
    #[error("Metadata store error: {0}")]
    Store(String),
}

impl From<DiscoverError> for CrateError {
    fn from(err: DiscoverError) -> Self {
        CrateError::Discover(err.to_string())
    }
}
