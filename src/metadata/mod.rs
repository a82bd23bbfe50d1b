//! Per-URL metadata store
//!
//! This module provides the durable record set that coordinates the pipeline.
//! Every discovered URL has exactly one `UrlRecord`; each stage acts only on
//! records in the state it expects and commits its transition back here,
//! which is what makes the pipeline resumable and idempotent.

mod store;

pub use store::{metadata_file, MergeOutcome, MetadataStore, StoreError, StoreSummary};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a discovered page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    Product,
    Document,
    Unknown,
}

/// Fetch lifecycle state of a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    NotCrawled,
    InProgress,
    Success,
    Failed,
}

/// Indexing state of a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    NotIndexed,
    Indexed,
    IndexFailed,
}

/// One record per discovered URL; the pipeline's central entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Normalized URL; unique key within one site's metadata set
    pub url: String,

    /// Last modification date from the sitemap
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,

    /// Priority from the sitemap
    #[serde(default)]
    pub priority: Option<f32>,

    /// Change frequency hint from the sitemap
    #[serde(default)]
    pub changefreq: Option<String>,

    /// Page classification; immutable once fetched
    pub page_type: PageType,

    /// Fetch state
    pub crawl_status: CrawlStatus,

    /// When the last fetch attempt concluded
    #[serde(default)]
    pub crawl_timestamp: Option<DateTime<Utc>>,

    /// Fetch attempts so far; monotonically increasing
    #[serde(default)]
    pub retry_count: u32,

    /// Error from the most recent failed attempt
    #[serde(default)]
    pub error_message: Option<String>,

    /// Relative path of the raw fetched body under the site directory
    #[serde(default)]
    pub local_content_path: Option<String>,

    /// Size of the raw fetched body in bytes
    #[serde(default)]
    pub content_size: Option<u64>,

    /// Relative path of the structured output under the site directory
    #[serde(default)]
    pub processed_path: Option<String>,

    /// Indexing state
    #[serde(default = "IndexStatus::default_not_indexed")]
    pub index_status: IndexStatus,
}

impl IndexStatus {
    fn default_not_indexed() -> Self {
        IndexStatus::NotIndexed
    }
}

impl UrlRecord {
    /// Create a freshly discovered record
    pub fn new(url: impl Into<String>, page_type: PageType) -> Self {
        Self {
            url: url.into(),
            last_modified: None,
            priority: None,
            changefreq: None,
            page_type,
            crawl_status: CrawlStatus::NotCrawled,
            crawl_timestamp: None,
            retry_count: 0,
            error_message: None,
            local_content_path: None,
            content_size: None,
            processed_path: None,
            index_status: IndexStatus::NotIndexed,
        }
    }

    /// Whether the fetch scheduler may claim this record
    pub fn fetch_eligible(&self, max_retries: u32) -> bool {
        match self.crawl_status {
            CrawlStatus::NotCrawled => true,
            CrawlStatus::Failed => self.retry_count < max_retries,
            CrawlStatus::InProgress | CrawlStatus::Success => false,
        }
    }
}

/// Candidate produced by the sitemap discoverer, merged into the store
#[derive(Debug, Clone)]
pub struct DiscoveredUrl {
    pub url: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub priority: Option<f32>,
    pub changefreq: Option<String>,
    pub page_type: PageType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_state() {
        let record = UrlRecord::new("https://example.com/a", PageType::Document);
        assert_eq!(record.crawl_status, CrawlStatus::NotCrawled);
        assert_eq!(record.index_status, IndexStatus::NotIndexed);
        assert_eq!(record.retry_count, 0);
        assert!(record.local_content_path.is_none());
    }

    #[test]
    fn test_fetch_eligibility() {
        let mut record = UrlRecord::new("https://example.com/a", PageType::Product);
        assert!(record.fetch_eligible(3));

        record.crawl_status = CrawlStatus::Success;
        assert!(!record.fetch_eligible(3));

        record.crawl_status = CrawlStatus::Failed;
        record.retry_count = 2;
        assert!(record.fetch_eligible(3));
        record.retry_count = 3;
        assert!(!record.fetch_eligible(3));
    }

    #[test]
    fn test_record_round_trips_as_json() {
        let mut record = UrlRecord::new("https://example.com/products/a", PageType::Product);
        record.crawl_status = CrawlStatus::Success;
        record.local_content_path = Some("html/products/a".to_string());
        record.content_size = Some(1024);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"crawl_status\":\"success\""));
        assert!(json.contains("\"page_type\":\"product\""));

        let back: UrlRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.url, record.url);
        assert_eq!(back.crawl_status, CrawlStatus::Success);
        assert_eq!(back.content_size, Some(1024));
    }
}
