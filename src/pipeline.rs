//! Run-level orchestration of the four pipeline stages.
//!
//! Each stage acts only on records in the state it expects, so the whole
//! run is crash-resumable: re-running after an interruption completes only
//! the remaining work. A discovery failure is non-fatal when earlier runs
//! already populated the store; configuration problems are the only
//! run-fatal errors.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::cache::LookupCache;
use crate::config::SiteConfig;
use crate::discover::{DiscoveryReport, discover_site};
use crate::error::{Error, Result};
use crate::fetch::{FetchReport, Fetcher, run_fetch};
use crate::index::{IndexReport, VectorStore, run_index};
use crate::metadata::{MetadataStore, StoreSummary, metadata_file};
use crate::process::{
    DocumentCleaner, Extractor, ProcessReport, ProcessorBackends, QaGenerator, process_site,
};

/// Every pluggable capability a full pipeline run depends on
#[derive(Clone)]
pub struct PipelineBackends {
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn Extractor>,
    pub cleaner: Arc<dyn DocumentCleaner>,
    pub qa: Arc<dyn QaGenerator>,
    pub vector_store: Arc<dyn VectorStore>,
    pub cache: Arc<dyn LookupCache>,
}

/// Per-stage reports for one pipeline run, persisted as `stats.json`
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub discovery: Option<DiscoveryReport>,
    pub discovery_error: Option<String>,
    pub fetch: FetchReport,
    pub process: ProcessReport,
    pub index: IndexReport,
    pub store: StoreSummary,
}

/// Run discover, fetch, process and index in order
#[instrument(skip_all, fields(site = config.site_url))]
pub async fn run_pipeline(
    config: &SiteConfig,
    backends: &PipelineBackends,
    force_fetch: bool,
    cancel: watch::Receiver<bool>,
) -> Result<RunSummary> {
    let site_dir = config.site_dir();
    tokio::fs::create_dir_all(&site_dir).await.map_err(|e| {
        Error::Config(format!(
            "cannot create data directory {}: {}",
            site_dir.display(),
            e
        ))
    })?;

    let store = Arc::new(MetadataStore::load(metadata_file(&site_dir)).await?);
    let mut summary = RunSummary::default();

    match discover_site(
        &*backends.fetcher,
        &store,
        &config.discovery,
        &config.fetch,
        &config.site_url,
    )
    .await
    {
        Ok(report) => summary.discovery = Some(report),
        Err(e) => {
            // Partial results are kept; a run over an already-discovered
            // store can still make progress.
            warn!("Discovery failed: {}", e);
            summary.discovery_error = Some(e.to_string());
        }
    }

    if !*cancel.borrow() {
        summary.fetch = run_fetch(
            store.clone(),
            backends.fetcher.clone(),
            &config.fetch,
            &site_dir,
            force_fetch,
            cancel.clone(),
        )
        .await?;
    }

    if !*cancel.borrow() {
        let processor_backends = ProcessorBackends {
            extractor: backends.extractor.clone(),
            cleaner: backends.cleaner.clone(),
            qa: backends.qa.clone(),
            cache: backends.cache.clone(),
        };
        summary.process = process_site(
            store.clone(),
            processor_backends,
            &config.processor,
            &site_dir,
            cancel.clone(),
        )
        .await?;
    }

    if !*cancel.borrow() {
        summary.index = run_index(
            store.clone(),
            backends.vector_store.clone(),
            backends.cache.clone(),
            &config.indexer,
            &site_dir,
            cancel.clone(),
        )
        .await?;
    }

    summary.store = store.summary();
    let stats_path = site_dir.join("stats.json");
    tokio::fs::write(&stats_path, serde_json::to_vec_pretty(&summary)?).await?;
    info!(
        "Run finished: {}/{} fetched, {} processed, {} indexed",
        summary.store.success, summary.store.total, summary.process.succeeded,
        summary.store.indexed
    );
    Ok(summary)
}
