//! Content processor module
//!
//! This module turns raw fetched pages into structured JSON. Product pages
//! go through schema-guided extraction; document pages get boilerplate
//! removal and, when their URL matches the configured patterns, a Q&A pass.
//! Processing is embarrassingly parallel across URLs; a failure on one URL
//! is recorded and never aborts the batch.

pub mod clean;
mod error;
pub mod extract;
pub mod qa;

pub use clean::{CleanedDocument, DocumentCleaner, HtmlCleaner, normalize_whitespace};
pub use error::ProcessError;
pub use extract::{Extractor, FieldDef, MetaTagExtractor, ProductRecord, ProductSchema};
pub use qa::{DisabledQa, QaGenerator, QaPair, valid_pairs};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::cache::LookupCache;
use crate::config::ProcessorConfig;
use crate::metadata::{CrawlStatus, MetadataStore, PageType, UrlRecord};

/// Structured output written for each document page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub url: String,
    pub title: String,
    pub clean_text: String,
    #[serde(default)]
    pub qa: Vec<QaPair>,
}

/// The pluggable capabilities the processor depends on
#[derive(Clone)]
pub struct ProcessorBackends {
    pub extractor: Arc<dyn Extractor>,
    pub cleaner: Arc<dyn DocumentCleaner>,
    pub qa: Arc<dyn QaGenerator>,
    pub cache: Arc<dyn LookupCache>,
}

/// Counts for one processing run
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessReport {
    pub total: usize,
    pub products: usize,
    pub documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Handle identifying a product: the last path segment of its URL
pub fn product_handle(url: &str) -> Result<String, ProcessError> {
    let parsed =
        Url::parse(url).map_err(|e| ProcessError::Other(format!("invalid URL {}: {}", url, e)))?;
    parsed
        .path_segments()
        .and_then(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .next_back()
                .map(String::from)
        })
        .ok_or_else(|| ProcessError::Other(format!("no path segment in {}", url)))
}

/// Output path for a document, derived from where its raw content lives:
/// `html/pages/faq` becomes `documents/pages/faq.json`
pub fn document_output_path(local_content_path: &str) -> String {
    let base = local_content_path
        .strip_prefix("html/")
        .unwrap_or(local_content_path);
    let stem = std::path::Path::new(base).with_extension("");
    format!("documents/{}.json", stem.display())
}

/// Process every fetched record that has no structured output yet
#[instrument(skip_all, fields(site_dir = %site_dir.display()))]
pub async fn process_site(
    store: Arc<MetadataStore>,
    backends: ProcessorBackends,
    config: &ProcessorConfig,
    site_dir: &Path,
    cancel: watch::Receiver<bool>,
) -> Result<ProcessReport, ProcessError> {
    let qa_patterns = config
        .qa_url_patterns
        .iter()
        .map(|p| Regex::new(p))
        .collect::<Result<Vec<_>, _>>()?;
    let qa_patterns = Arc::new(qa_patterns);
    let schema = Arc::new(config.product_schema.clone());

    let pending = store.records_where(|r| {
        r.crawl_status == CrawlStatus::Success && r.processed_path.is_none()
    });
    info!("Processing {} records", pending.len());

    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let tasks = pending
        .into_iter()
        .map(|record| {
            let store = store.clone();
            let backends = backends.clone();
            let schema = schema.clone();
            let qa_patterns = qa_patterns.clone();
            let semaphore = semaphore.clone();
            let site_dir = site_dir.to_path_buf();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return RecordOutcome::Failed(PageType::Unknown),
                };
                if *cancel.borrow() {
                    return RecordOutcome::Cancelled;
                }
                let page_type = record.page_type;
                match process_one(&store, &backends, &schema, &qa_patterns, &site_dir, &record)
                    .await
                {
                    Ok(()) => RecordOutcome::Processed(page_type),
                    Err(e) => {
                        error!("Failed to process {}: {}", record.url, e);
                        RecordOutcome::Failed(page_type)
                    }
                }
            })
        })
        .collect::<Vec<_>>();

    let mut report = ProcessReport::default();
    for result in futures::future::join_all(tasks).await {
        report.total += 1;
        match result {
            Ok(RecordOutcome::Processed(page_type)) => {
                report.succeeded += 1;
                match page_type {
                    PageType::Product => report.products += 1,
                    _ => report.documents += 1,
                }
            }
            Ok(RecordOutcome::Failed(_)) => report.failed += 1,
            Ok(RecordOutcome::Cancelled) => report.cancelled += 1,
            Err(e) => {
                error!("Processing worker panicked: {}", e);
                report.failed += 1;
            }
        }
    }

    if let Err(e) = store.save().await {
        warn!("Failed to persist metadata: {}", e);
    }
    info!(
        "Processing finished: {} succeeded ({} products, {} documents), {} failed",
        report.succeeded, report.products, report.documents, report.failed
    );
    Ok(report)
}

enum RecordOutcome {
    Processed(PageType),
    Failed(PageType),
    Cancelled,
}

async fn process_one(
    store: &MetadataStore,
    backends: &ProcessorBackends,
    schema: &ProductSchema,
    qa_patterns: &[Regex],
    site_dir: &Path,
    record: &UrlRecord,
) -> Result<(), ProcessError> {
    let local = record
        .local_content_path
        .as_deref()
        .ok_or_else(|| ProcessError::MissingContent(record.url.clone()))?;
    let raw = tokio::fs::read_to_string(site_dir.join(local)).await?;

    let rel = match record.page_type {
        PageType::Product => process_product(backends, schema, site_dir, &record.url, &raw).await?,
        PageType::Document | PageType::Unknown => {
            process_document(backends, qa_patterns, site_dir, record, &raw).await?
        }
    };

    store.set_processed(&record.url, &rel)?;
    debug!("Processed {} -> {}", record.url, rel);
    Ok(())
}

async fn process_product(
    backends: &ProcessorBackends,
    schema: &ProductSchema,
    site_dir: &Path,
    url: &str,
    raw: &str,
) -> Result<String, ProcessError> {
    let cache_key = format!("extract:{}", url);
    let fields: BTreeMap<String, Value> = match backends.cache.get(&cache_key).await {
        Some(cached) => serde_json::from_str(&cached)?,
        None => {
            let fields = backends.extractor.extract(raw, schema).await?;
            backends
                .cache
                .set(&cache_key, serde_json::to_string(&fields)?)
                .await;
            fields
        }
    };

    for name in schema.required_fields() {
        if !fields.contains_key(name) {
            warn!("Extraction for {} is missing required field '{}'", url, name);
        }
    }

    let product = ProductRecord::from_fields(fields);
    let rel = format!("products/{}.json", product_handle(url)?);
    write_json(site_dir, &rel, &product).await?;
    Ok(rel)
}

async fn process_document(
    backends: &ProcessorBackends,
    qa_patterns: &[Regex],
    site_dir: &Path,
    record: &UrlRecord,
    raw: &str,
) -> Result<String, ProcessError> {
    let cleaned = backends.cleaner.clean(raw).await?;

    let qa = if qa_patterns.iter().any(|p| p.is_match(&record.url)) {
        let cache_key = format!("qa:{}", record.url);
        match backends.cache.get(&cache_key).await {
            Some(cached) => serde_json::from_str(&cached)?,
            None => {
                let pairs = valid_pairs(backends.qa.generate_qa(&cleaned.clean_text).await?);
                backends
                    .cache
                    .set(&cache_key, serde_json::to_string(&pairs)?)
                    .await;
                pairs
            }
        }
    } else {
        Vec::new()
    };

    let local = record
        .local_content_path
        .as_deref()
        .ok_or_else(|| ProcessError::MissingContent(record.url.clone()))?;
    let rel = document_output_path(local);
    let doc = ProcessedDocument {
        url: record.url.clone(),
        title: cleaned.title,
        clean_text: cleaned.clean_text,
        qa,
    };
    write_json(site_dir, &rel, &doc).await?;
    Ok(rel)
}

async fn write_json<T: Serialize>(
    site_dir: &Path,
    rel: &str,
    value: &T,
) -> Result<PathBuf, ProcessError> {
    let full = site_dir.join(rel);
    if let Some(parent) = full.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&full, serde_json::to_vec_pretty(value)?).await?;
    Ok(full)
}
