//! Durable store for `UrlRecord`s, persisted as a JSON map keyed by URL.
//!
//! Every mutation is a read-modify-write on exactly one record behind the
//! store lock, so concurrent workers can never observe or commit a partial
//! transition. Persistence goes through a temp file plus rename so a crash
//! mid-save leaves the previous file intact.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info};

use super::{CrawlStatus, DiscoveredUrl, IndexStatus, PageType, UrlRecord};
use crate::error::Error as CrateError;

/// Error type for metadata store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown URL: {0}")]
    UnknownUrl(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl From<StoreError> for CrateError {
    fn from(err: StoreError) -> Self {
        CrateError::Store(err.to_string())
    }
}

type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of merging a discovery pass into the store
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
}

/// Counts by state, suitable for operational visibility
#[derive(Debug, Default, Clone, Serialize)]
pub struct StoreSummary {
    pub total: usize,
    pub not_crawled: usize,
    pub in_progress: usize,
    pub success: usize,
    pub failed: usize,
    pub not_indexed: usize,
    pub indexed: usize,
    pub index_failed: usize,
    pub products: usize,
    pub documents: usize,
}

/// Keyed record set for every discovered URL of one site
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, UrlRecord>>,
    // Serializes temp-file writes; concurrent saves must not interleave.
    save_lock: tokio::sync::Mutex<()>,
}

impl MetadataStore {
    /// Load the store from disk, starting empty if the file does not exist
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if fs::try_exists(&path).await? {
            let text = fs::read_to_string(&path).await?;
            serde_json::from_str(&text)?
        } else {
            BTreeMap::new()
        };
        debug!("Loaded {} records from {}", records.len(), path.display());
        Ok(Self {
            path,
            records: Mutex::new(records),
            save_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Persist the current record set atomically
    pub async fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        let snapshot = self.lock().clone();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, UrlRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Get a copy of one record
    pub fn get(&self, url: &str) -> Option<UrlRecord> {
        self.lock().get(url).cloned()
    }

    /// Copies of all records matching the predicate
    pub fn records_where(&self, pred: impl Fn(&UrlRecord) -> bool) -> Vec<UrlRecord> {
        self.lock().values().filter(|r| pred(r)).cloned().collect()
    }

    /// Merge discovered candidates: insert new URLs as NotCrawled, update
    /// sitemap fields on existing ones without ever touching crawl state.
    /// Reclassification of `page_type` is allowed only while NotCrawled.
    pub fn merge_discovered(&self, candidates: &[DiscoveredUrl]) -> MergeOutcome {
        let mut records = self.lock();
        let mut outcome = MergeOutcome::default();
        for candidate in candidates {
            match records.get_mut(&candidate.url) {
                Some(record) => {
                    if candidate.last_modified.is_some() {
                        record.last_modified = candidate.last_modified;
                    }
                    if candidate.priority.is_some() {
                        record.priority = candidate.priority;
                    }
                    if candidate.changefreq.is_some() {
                        record.changefreq = candidate.changefreq.clone();
                    }
                    if record.crawl_status == CrawlStatus::NotCrawled {
                        record.page_type = candidate.page_type;
                    }
                    outcome.updated += 1;
                }
                None => {
                    let mut record = UrlRecord::new(&candidate.url, candidate.page_type);
                    record.last_modified = candidate.last_modified;
                    record.priority = candidate.priority;
                    record.changefreq = candidate.changefreq.clone();
                    records.insert(candidate.url.clone(), record);
                    outcome.inserted += 1;
                }
            }
        }
        outcome
    }

    /// Claim every fetch-eligible record in one atomic pass, marking each
    /// InProgress. With `force` set, Success records are reclaimed too.
    pub fn claim_eligible(&self, max_retries: u32, force: bool) -> Vec<UrlRecord> {
        let mut records = self.lock();
        let mut claimed = Vec::new();
        for record in records.values_mut() {
            let eligible = record.fetch_eligible(max_retries)
                || (force && record.crawl_status == CrawlStatus::Success);
            if eligible {
                record.crawl_status = CrawlStatus::InProgress;
                claimed.push(record.clone());
            }
        }
        claimed
    }

    /// Records left InProgress by an interrupted run become eligible again
    pub fn reset_stale_in_progress(&self) -> usize {
        let mut records = self.lock();
        let mut reset = 0;
        for record in records.values_mut() {
            if record.crawl_status == CrawlStatus::InProgress {
                record.crawl_status = CrawlStatus::NotCrawled;
                reset += 1;
            }
        }
        if reset > 0 {
            info!("Reset {} stale in-progress records", reset);
        }
        reset
    }

    /// Explicitly re-arm permanently failed records for another retry budget
    pub fn reset_failed(&self) -> usize {
        let mut records = self.lock();
        let mut reset = 0;
        for record in records.values_mut() {
            if record.crawl_status == CrawlStatus::Failed {
                record.crawl_status = CrawlStatus::NotCrawled;
                record.retry_count = 0;
                record.error_message = None;
                reset += 1;
            }
        }
        reset
    }

    /// Commit a successful fetch
    pub fn record_success(&self, url: &str, local_path: &str, size: u64) -> Result<()> {
        self.with_record(url, |record| {
            record.crawl_status = CrawlStatus::Success;
            record.crawl_timestamp = Some(Utc::now());
            record.local_content_path = Some(local_path.to_string());
            record.content_size = Some(size);
            record.error_message = None;
            Ok(())
        })
    }

    /// Commit a terminal fetch failure
    pub fn record_failure(&self, url: &str, message: &str) -> Result<()> {
        self.with_record(url, |record| {
            record.crawl_status = CrawlStatus::Failed;
            record.crawl_timestamp = Some(Utc::now());
            record.error_message = Some(message.to_string());
            Ok(())
        })
    }

    /// Increment the attempt counter, returning the new count
    pub fn bump_retry(&self, url: &str) -> Result<u32> {
        let mut records = self.lock();
        let record = records
            .get_mut(url)
            .ok_or_else(|| StoreError::UnknownUrl(url.to_string()))?;
        record.retry_count += 1;
        Ok(record.retry_count)
    }

    /// Record the structured output path; only valid on fetched records
    pub fn set_processed(&self, url: &str, path: &str) -> Result<()> {
        self.with_record(url, |record| {
            if record.crawl_status != CrawlStatus::Success {
                return Err(StoreError::InvalidTransition(format!(
                    "cannot mark {} processed before a successful fetch",
                    record.url
                )));
            }
            record.processed_path = Some(path.to_string());
            Ok(())
        })
    }

    pub fn set_index_status(&self, url: &str, status: IndexStatus) -> Result<()> {
        self.with_record(url, |record| {
            record.index_status = status;
            Ok(())
        })
    }

    fn with_record(
        &self,
        url: &str,
        apply: impl FnOnce(&mut UrlRecord) -> Result<()>,
    ) -> Result<()> {
        let mut records = self.lock();
        let record = records
            .get_mut(url)
            .ok_or_else(|| StoreError::UnknownUrl(url.to_string()))?;
        apply(record)
    }

    /// Counts by crawl/index status and page type
    pub fn summary(&self) -> StoreSummary {
        let records = self.lock();
        let mut summary = StoreSummary {
            total: records.len(),
            ..StoreSummary::default()
        };
        for record in records.values() {
            match record.crawl_status {
                CrawlStatus::NotCrawled => summary.not_crawled += 1,
                CrawlStatus::InProgress => summary.in_progress += 1,
                CrawlStatus::Success => summary.success += 1,
                CrawlStatus::Failed => summary.failed += 1,
            }
            match record.index_status {
                IndexStatus::NotIndexed => summary.not_indexed += 1,
                IndexStatus::Indexed => summary.indexed += 1,
                IndexStatus::IndexFailed => summary.index_failed += 1,
            }
            match record.page_type {
                PageType::Product => summary.products += 1,
                PageType::Document | PageType::Unknown => summary.documents += 1,
            }
        }
        summary
    }
}

/// Default on-disk file name for the unified record set
pub fn metadata_file(site_dir: &Path) -> PathBuf {
    site_dir.join("pages_metadata.json")
}
