//! # sitepipe CLI
//!
//! Command-line interface for the crawl-and-transform pipeline. Each stage
//! is independently invocable, and `run` drives all four in order:
//!
//! - `discover`: sitemap discovery into the metadata store
//! - `fetch`: concurrent page fetching with retries and proxy fallback
//! - `process`: structured extraction and document cleaning
//! - `index`: chunking, embedding and vector upserts
//! - `run`: the full pipeline end to end
//! - `stats`: store counts for operational visibility
//! - `reset-failed`: re-arm permanently failed URLs
//!
//! Configuration comes from a defaults YAML file plus an optional per-site
//! overlay; a handful of flags override the fetch section ad hoc.

mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;

use sitepipe::cache::MemoryCache;
use sitepipe::config::SiteConfig;
use sitepipe::discover::discover_site;
use sitepipe::fetch::{HttpFetcher, run_fetch};
use sitepipe::index::{RestVectorStore, run_index};
use sitepipe::metadata::{MetadataStore, metadata_file};
use sitepipe::pipeline::{PipelineBackends, run_pipeline};
use sitepipe::process::{
    DisabledQa, HtmlCleaner, MetaTagExtractor, ProcessorBackends, process_site,
};

#[derive(Parser)]
#[command(author, version, about = "Turn a website into a searchable, structured dataset", long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Defaults configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    /// Per-site configuration overlay
    #[arg(short, long)]
    site_config: Option<PathBuf>,

    /// Override the site root URL
    #[arg(long)]
    site_url: Option<String>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover URLs from the site's sitemaps
    Discover,

    /// Fetch discovered pages
    Fetch(FetchArgs),

    /// Process fetched pages into structured JSON
    Process,

    /// Chunk, embed and upsert processed content
    Index,

    /// Run the full pipeline end to end
    Run(FetchArgs),

    /// Print store counts
    Stats,

    /// Re-arm permanently failed URLs for another fetch budget
    ResetFailed,
}

impl Commands {
    fn fetch_args(&self) -> Option<&FetchArgs> {
        match self {
            Commands::Fetch(args) | Commands::Run(args) => Some(args),
            _ => None,
        }
    }
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Refetch pages that already succeeded
    #[arg(long)]
    force: bool,

    /// Override worker pool width
    #[arg(long)]
    concurrency: Option<usize>,

    /// Override inter-request delay in milliseconds
    #[arg(long)]
    delay: Option<u64>,

    /// Override request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Override maximum fetch attempts per URL
    #[arg(long)]
    max_retries: Option<u32>,
}

impl FetchArgs {
    fn apply(&self, config: &mut SiteConfig) {
        if let Some(concurrency) = self.concurrency {
            config.fetch.concurrency = concurrency;
        }
        if let Some(delay) = self.delay {
            config.fetch.request_delay_ms = delay;
        }
        if let Some(timeout) = self.timeout {
            config.fetch.timeout_secs = timeout;
        }
        if let Some(max_retries) = self.max_retries {
            config.fetch.max_retries = max_retries;
        }
    }
}

fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });
    rx
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::default_spinner());
    bar.set_message(message.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar
}

fn print_report<T: serde::Serialize>(report: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing_subscriber();
    let cli = Cli::parse();

    let mut config = SiteConfig::load(&cli.common.config, cli.common.site_config.as_deref())
        .with_context(|| {
            format!(
                "failed to load configuration from {}",
                cli.common.config.display()
            )
        })?;
    if let Some(url) = &cli.common.site_url {
        config.site_url = url.clone();
    }
    if let Some(dir) = &cli.common.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(args) = cli.command.fetch_args() {
        args.apply(&mut config);
    }
    config.validate()?;

    let site_dir = config.site_dir();
    tokio::fs::create_dir_all(&site_dir)
        .await
        .with_context(|| format!("cannot create data directory {}", site_dir.display()))?;

    match &cli.command {
        Commands::Discover => {
            let store = MetadataStore::load(metadata_file(&site_dir)).await?;
            let fetcher = HttpFetcher::new(&config.fetch)?;
            let report = discover_site(
                &fetcher,
                &store,
                &config.discovery,
                &config.fetch,
                &config.site_url,
            )
            .await?;
            print_report(&report)?;
        }
        Commands::Fetch(args) => {
            let store = Arc::new(MetadataStore::load(metadata_file(&site_dir)).await?);
            let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
            let bar = spinner("Fetching pages");
            let report = run_fetch(
                store,
                fetcher,
                &config.fetch,
                &site_dir,
                args.force,
                cancel_on_ctrl_c(),
            )
            .await?;
            bar.finish_and_clear();
            print_report(&report)?;
        }
        Commands::Process => {
            let store = Arc::new(MetadataStore::load(metadata_file(&site_dir)).await?);
            let backends = ProcessorBackends {
                extractor: Arc::new(MetaTagExtractor),
                cleaner: Arc::new(HtmlCleaner::default()),
                qa: Arc::new(DisabledQa),
                cache: Arc::new(MemoryCache::new()),
            };
            let bar = spinner("Processing content");
            let report = process_site(
                store,
                backends,
                &config.processor,
                &site_dir,
                cancel_on_ctrl_c(),
            )
            .await?;
            bar.finish_and_clear();
            print_report(&report)?;
        }
        Commands::Index => {
            let store = Arc::new(MetadataStore::load(metadata_file(&site_dir)).await?);
            let service = config
                .indexer
                .vector_service
                .clone()
                .ok_or_else(|| anyhow!("indexer.vector_service must be configured"))?;
            let vector_store = Arc::new(RestVectorStore::new(service)?);
            let bar = spinner("Indexing content");
            let report = run_index(
                store,
                vector_store,
                Arc::new(MemoryCache::new()),
                &config.indexer,
                &site_dir,
                cancel_on_ctrl_c(),
            )
            .await?;
            bar.finish_and_clear();
            print_report(&report)?;
        }
        Commands::Run(_) => {
            let service = config
                .indexer
                .vector_service
                .clone()
                .ok_or_else(|| anyhow!("indexer.vector_service must be configured"))?;
            let backends = PipelineBackends {
                fetcher: Arc::new(HttpFetcher::new(&config.fetch)?),
                extractor: Arc::new(MetaTagExtractor),
                cleaner: Arc::new(HtmlCleaner::default()),
                qa: Arc::new(DisabledQa),
                vector_store: Arc::new(RestVectorStore::new(service)?),
                cache: Arc::new(MemoryCache::new()),
            };
            let force = cli
                .command
                .fetch_args()
                .map(|args| args.force)
                .unwrap_or(false);
            let bar = spinner("Running pipeline");
            let summary = run_pipeline(&config, &backends, force, cancel_on_ctrl_c()).await?;
            bar.finish_and_clear();
            print_report(&summary)?;
        }
        Commands::Stats => {
            let store = MetadataStore::load(metadata_file(&site_dir)).await?;
            print_report(&store.summary())?;
        }
        Commands::ResetFailed => {
            let store = MetadataStore::load(metadata_file(&site_dir)).await?;
            let reset = store.reset_failed();
            store.save().await?;
            println!("Reset {} failed URLs", reset);
        }
    }

    Ok(())
}
