//! # sitepipe — turn a website into a searchable, structured dataset
//!
//! This crate implements a crawl-and-transform pipeline: it discovers a
//! site's URLs from its sitemaps, fetches them under load constraints,
//! classifies and extracts structured content, and feeds a vector search
//! index. The per-URL metadata store is the coordination point between the
//! stages, which makes every stage independently re-runnable and the whole
//! pipeline crash-resumable.
//!
//! ## Features
//!
//! - Sitemap discovery from robots.txt with index recursion and filtering
//! - Concurrent fetch scheduler with rate limiting, retries with backoff,
//!   anti-bot detection and proxy/JS-render fallback
//! - Durable per-URL state machine persisted as JSON, resumable and
//!   idempotent across runs
//! - Product extraction against a per-site schema and document cleaning
//!   with optional Q&A generation, through pluggable backends
//! - Deterministic sentence-boundary chunking and batched, retried upserts
//!   into a pluggable vector store
//! - Async API with Tokio, structured logging with tracing
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sitepipe::cache::MemoryCache;
//! use sitepipe::config::SiteConfig;
//! use sitepipe::fetch::HttpFetcher;
//! use sitepipe::index::{RestVectorStore, VectorServiceConfig};
//! use sitepipe::pipeline::{run_pipeline, PipelineBackends};
//! use sitepipe::process::{DisabledQa, HtmlCleaner, MetaTagExtractor};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = SiteConfig::default();
//!     config.site_url = "https://shop.example.com".to_string();
//!     config.validate()?;
//!
//!     let backends = PipelineBackends {
//!         fetcher: Arc::new(HttpFetcher::new(&config.fetch)?),
//!         extractor: Arc::new(MetaTagExtractor),
//!         cleaner: Arc::new(HtmlCleaner::default()),
//!         qa: Arc::new(DisabledQa),
//!         vector_store: Arc::new(RestVectorStore::new(VectorServiceConfig {
//!             embed_endpoint: "https://api.example.com/v1/embeddings".into(),
//!             upsert_endpoint: "https://vectors.example.com/points".into(),
//!             api_key: "secret".into(),
//!             model: "text-embedding-3-small".into(),
//!             dimensions: None,
//!         })?),
//!         cache: Arc::new(MemoryCache::new()),
//!     };
//!
//!     let (_cancel_tx, cancel_rx) = watch::channel(false);
//!     let summary = run_pipeline(&config, &backends, false, cancel_rx).await?;
//!     println!("{}", serde_json::to_string_pretty(&summary)?);
//!     Ok(())
//! }
//! ```

mod error;

pub mod cache;
pub mod config;
pub mod discover;
pub mod fetch;
pub mod index;
pub mod metadata;
pub mod pipeline;
pub mod process;

pub use error::Error;

/// Re-export of common types for public use
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::error::Result;
}
