//! Fetch scheduler module
//!
//! This module drains pending URLs from the metadata store with bounded
//! concurrency, rate limiting, retries and proxy fallback, writing each
//! record's terminal fetch state back to the store.
//!
//! The worker pool provides parallelism, the rate limiter provides
//! politeness; a dispatch happens only once both are satisfied. Every state
//! transition is committed to the store as it happens, so an interrupted run
//! resumes cleanly.

mod antibot;
mod backend;
mod error;

pub use antibot::BlockDetector;
pub use backend::{FetchMode, FetchOptions, FetchResponse, Fetcher, HttpFetcher};
pub use error::FetchError;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Serialize;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::metadata::MetadataStore;

/// Counts for one fetch run
#[derive(Debug, Default, Clone, Serialize)]
pub struct FetchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub bytes: u64,
}

/// Relative storage path for a URL's raw body under the site directory
pub fn content_path(url: &str) -> Result<String, FetchError> {
    let parsed = Url::parse(url)?;
    let path = parsed.path();
    if path.is_empty() || path == "/" {
        return Ok("html/index.html".to_string());
    }

    let safe: String = path
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '/' | '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = safe.trim_matches('/');

    if path.ends_with('/') {
        Ok(format!("html/{}/index.html", trimmed))
    } else {
        Ok(format!("html/{}", trimmed))
    }
}

enum Attempt {
    Success(String),
    Transient(String),
    Permanent(String),
}

enum UrlOutcome {
    Fetched(u64),
    Failed,
    Cancelled,
}

/// Drain all fetch-eligible records for the site.
///
/// Success-state records are skipped unless `force` is set; records that
/// exhausted their retry budget stay Failed. Cancellation aborts in-flight
/// fetches but keeps every committed transition.
#[instrument(skip_all, fields(site_dir = %site_dir.display()))]
pub async fn run_fetch(
    store: Arc<MetadataStore>,
    fetcher: Arc<dyn Fetcher>,
    config: &FetchConfig,
    site_dir: &Path,
    force: bool,
    cancel: watch::Receiver<bool>,
) -> Result<FetchReport, FetchError> {
    let detector = Arc::new(BlockDetector::from_config(config)?);
    let config = Arc::new(config.clone());

    store.reset_stale_in_progress();
    let skipped = if force {
        0
    } else {
        store
            .records_where(|r| r.crawl_status == crate::metadata::CrawlStatus::Success)
            .len()
    };

    let claimed = store.claim_eligible(config.max_retries, force);
    info!(
        "Fetching {} URLs ({} already succeeded, skipped)",
        claimed.len(),
        skipped
    );

    let limiter: Option<Arc<DefaultDirectRateLimiter>> = if config.request_delay_ms > 0 {
        Quota::with_period(config.request_delay())
            .map(|quota| Arc::new(RateLimiter::direct(quota)))
    } else {
        None
    };
    let semaphore = Arc::new(Semaphore::new(config.concurrency));

    let tasks = claimed
        .iter()
        .map(|record| {
            let store = store.clone();
            let fetcher = fetcher.clone();
            let config = config.clone();
            let detector = detector.clone();
            let limiter = limiter.clone();
            let semaphore = semaphore.clone();
            let site_dir = site_dir.to_path_buf();
            let cancel = cancel.clone();
            let url = record.url.clone();
            tokio::spawn(async move {
                fetch_one(
                    store, fetcher, config, detector, limiter, semaphore, site_dir, url, cancel,
                )
                .await
            })
        })
        .collect::<Vec<_>>();

    let mut report = FetchReport {
        total: claimed.len(),
        skipped,
        ..FetchReport::default()
    };
    for result in futures::future::join_all(tasks).await {
        match result {
            Ok(UrlOutcome::Fetched(bytes)) => {
                report.succeeded += 1;
                report.bytes += bytes;
            }
            Ok(UrlOutcome::Failed) => report.failed += 1,
            Ok(UrlOutcome::Cancelled) => report.cancelled += 1,
            Err(e) => {
                error!("Fetch worker panicked: {}", e);
                report.failed += 1;
            }
        }
    }

    if let Err(e) = store.save().await {
        warn!("Failed to persist metadata: {}", e);
    }
    info!(
        "Fetch finished: {} succeeded, {} failed, {} cancelled",
        report.succeeded, report.failed, report.cancelled
    );
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
async fn fetch_one(
    store: Arc<MetadataStore>,
    fetcher: Arc<dyn Fetcher>,
    config: Arc<FetchConfig>,
    detector: Arc<BlockDetector>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    semaphore: Arc<Semaphore>,
    site_dir: PathBuf,
    url: String,
    mut cancel: watch::Receiver<bool>,
) -> UrlOutcome {
    loop {
        if *cancel.borrow() {
            debug!("Cancelled before dispatch: {}", url);
            return UrlOutcome::Cancelled;
        }

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("Worker pool closed: {}", e);
                return UrlOutcome::Failed;
            }
        };
        if let Some(limiter) = &limiter {
            limiter.until_ready().await;
        }

        let attempt = tokio::select! {
            _ = cancel.changed() => {
                debug!("Cancelled in flight: {}", url);
                return UrlOutcome::Cancelled;
            }
            attempt = attempt_fetch(&*fetcher, &config, &detector, &url) => attempt,
        };
        drop(permit);

        match attempt {
            Attempt::Success(body) => {
                return match commit_success(&store, &site_dir, &url, body).await {
                    Ok(bytes) => UrlOutcome::Fetched(bytes),
                    Err(e) => {
                        error!("Failed to store content for {}: {}", url, e);
                        commit_failure(&store, &url, &format!("storage error: {}", e)).await;
                        UrlOutcome::Failed
                    }
                };
            }
            Attempt::Permanent(message) => {
                warn!("Permanent failure for {}: {}", url, message);
                commit_failure(&store, &url, &message).await;
                return UrlOutcome::Failed;
            }
            Attempt::Transient(message) => {
                let count = match store.bump_retry(&url) {
                    Ok(count) => count,
                    Err(e) => {
                        error!("Lost record for {}: {}", url, e);
                        return UrlOutcome::Failed;
                    }
                };
                if count >= config.max_retries {
                    warn!(
                        "Retry budget exhausted for {} after {} attempts: {}",
                        url, count, message
                    );
                    commit_failure(&store, &url, &message).await;
                    return UrlOutcome::Failed;
                }
                let delay = config.backoff.delay(count);
                debug!(
                    "Transient failure for {} (attempt {}): {}; retrying in {:?}",
                    url, count, message, delay
                );
                tokio::select! {
                    _ = cancel.changed() => return UrlOutcome::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn attempt_fetch(
    fetcher: &dyn Fetcher,
    config: &FetchConfig,
    detector: &BlockDetector,
    url: &str,
) -> Attempt {
    match fetcher.fetch(url, &FetchOptions::direct(config)).await {
        Ok(response) => {
            if detector.is_blocked(response.status, &response.body) {
                debug!("Anti-bot block detected for {} (HTTP {})", url, response.status);
                render_fallback(fetcher, config, detector, url).await
            } else {
                classify_response(response)
            }
        }
        Err(FetchError::Timeout(_)) => Attempt::Transient("request timed out".to_string()),
        Err(e) => Attempt::Transient(e.to_string()),
    }
}

async fn render_fallback(
    fetcher: &dyn Fetcher,
    config: &FetchConfig,
    detector: &BlockDetector,
    url: &str,
) -> Attempt {
    match fetcher.fetch(url, &FetchOptions::render(config)).await {
        Ok(response) => {
            if detector.is_blocked(response.status, &response.body) {
                Attempt::Transient("anti-bot block persisted through proxy fallback".to_string())
            } else {
                classify_response(response)
            }
        }
        Err(FetchError::Proxy(message)) => {
            Attempt::Transient(format!("anti-bot block, proxy unavailable: {}", message))
        }
        Err(FetchError::Timeout(_)) => {
            Attempt::Transient("proxy fallback timed out".to_string())
        }
        Err(e) => Attempt::Transient(format!("proxy fallback failed: {}", e)),
    }
}

fn classify_response(response: FetchResponse) -> Attempt {
    if response.is_success() {
        Attempt::Success(response.body)
    } else if response.status >= 500 {
        Attempt::Transient(format!("HTTP {}", response.status))
    } else {
        // Non-block 4xx responses are not worth retrying.
        Attempt::Permanent(format!("HTTP {}", response.status))
    }
}

async fn commit_success(
    store: &MetadataStore,
    site_dir: &Path,
    url: &str,
    body: String,
) -> Result<u64, FetchError> {
    let rel = content_path(url)?;
    let full = site_dir.join(&rel);
    if let Some(parent) = full.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = body.len() as u64;
    tokio::fs::write(&full, body).await?;
    store.record_success(url, &rel, bytes)?;
    if let Err(e) = store.save().await {
        warn!("Failed to persist metadata after {}: {}", url, e);
    }
    debug!("Stored {} ({} bytes) at {}", url, bytes, full.display());
    Ok(bytes)
}

async fn commit_failure(store: &MetadataStore, url: &str, message: &str) {
    if let Err(e) = store.record_failure(url, message) {
        error!("Failed to record failure for {}: {}", url, e);
    }
    if let Err(e) = store.save().await {
        warn!("Failed to persist metadata after {}: {}", url, e);
    }
}

impl From<crate::metadata::StoreError> for FetchError {
    fn from(err: crate::metadata::StoreError) -> Self {
        FetchError::Other(err.to_string())
    }
}
