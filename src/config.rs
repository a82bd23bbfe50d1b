//! # Layered Site Configuration
//!
//! One `SiteConfig` is resolved at startup from a defaults YAML file plus an
//! optional per-site overlay, then passed by reference into each pipeline
//! component. No component reads configuration on its own.
//!
//! ## Key Components
//!
//! - `SiteConfig`: the resolved configuration for one site run
//! - `DiscoveryConfig` / `FetchConfig` / `ProcessorConfig` / `IndexerConfig`:
//!   per-component sections
//! - `BackoffPolicy`: fixed or exponential retry delays
//!
//! The overlay merge is shallow: a top-level key present in the site file
//! replaces the whole section from the defaults file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error as CrateError;
use crate::index::backend::VectorServiceConfig;
use crate::process::extract::ProductSchema;

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem error reading a config file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Semantically invalid configuration
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for CrateError {
    fn from(err: ConfigError) -> Self {
        CrateError::Config(err.to_string())
    }
}

/// Resolved configuration for one site run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Root URL of the site to crawl
    pub site_url: String,

    /// Data root; per-site state lives under `<data_dir>/<domain>`
    pub data_dir: PathBuf,

    /// Sitemap discovery options
    pub discovery: DiscoveryConfig,

    /// Fetch scheduler options
    pub fetch: FetchConfig,

    /// Content processor options
    pub processor: ProcessorConfig,

    /// Indexer options
    pub indexer: IndexerConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_url: String::new(),
            data_dir: PathBuf::from("data"),
            discovery: DiscoveryConfig::default(),
            fetch: FetchConfig::default(),
            processor: ProcessorConfig::default(),
            indexer: IndexerConfig::default(),
        }
    }
}

/// Sitemap discovery options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Regex patterns a child sitemap URL must match to be followed;
    /// empty means follow all
    pub sitemap_allow_patterns: Vec<String>,

    /// Maximum sitemap-index recursion depth
    pub max_sitemap_depth: usize,

    /// URL path prefixes that classify a page as a product
    pub product_path_prefixes: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sitemap_allow_patterns: Vec::new(),
            max_sitemap_depth: 4,
            product_path_prefixes: vec!["/products/".to_string()],
        }
    }
}

/// Fetch scheduler options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Request timeout in seconds for direct fetches
    pub timeout_secs: u64,

    /// Minimum delay between request dispatches in milliseconds
    pub request_delay_ms: u64,

    /// Maximum fetch attempts per URL
    pub max_retries: u32,

    /// Worker pool width
    pub concurrency: usize,

    /// Extra request headers
    pub headers: BTreeMap<String, String>,

    /// Whether to keep a cookie jar across requests
    pub use_cookies: bool,

    /// Timeout in seconds for proxy/JS-render fetches
    pub render_timeout_secs: u64,

    /// User agent for direct requests
    pub user_agent: String,

    /// Retry delay policy
    pub backoff: BackoffPolicy,

    /// HTTP status codes treated as an anti-bot block
    pub block_status_codes: Vec<u16>,

    /// Body regex patterns treated as an anti-bot block
    pub block_patterns: Vec<String>,

    /// Proxy/rendering service used as the anti-bot fallback
    pub proxy: Option<ProxyConfig>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            request_delay_ms: 1000,
            max_retries: 3,
            concurrency: 5,
            headers: BTreeMap::new(),
            use_cookies: true,
            render_timeout_secs: 60,
            user_agent: format!("sitepipe/{}", env!("CARGO_PKG_VERSION")),
            backoff: BackoffPolicy::default(),
            block_status_codes: vec![403, 429, 503],
            block_patterns: Vec::new(),
            proxy: None,
        }
    }
}

impl FetchConfig {
    /// Get the direct-fetch timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get the render-fetch timeout as a Duration
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    /// Get the inter-dispatch delay as a Duration
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Named proxy/rendering providers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProxyConfig {
    /// ZenRows request-proxying API
    ZenRows {
        api_key: String,
        /// Ask the service to execute JavaScript before returning the body
        #[serde(default = "default_true")]
        js_render: bool,
    },

    /// Browserless content-rendering API
    Browserless {
        api_key: String,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

fn default_true() -> bool {
    true
}

/// Retry delay policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same delay before every retry
    Fixed { delay_ms: u64 },

    /// Doubling delay, capped at `max_ms`
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential {
            base_ms: 500,
            max_ms: 10_000,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            Self::Exponential { base_ms, max_ms } => {
                let exp = attempt.saturating_sub(1).min(20);
                let delay = base_ms.saturating_mul(2u64.saturating_pow(exp));
                Duration::from_millis(delay.min(*max_ms))
            }
        }
    }
}

/// Content processor options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Worker pool width
    pub workers: usize,

    /// Regex patterns; documents whose URL matches get a Q&A pass
    pub qa_url_patterns: Vec<String>,

    /// Per-site product extraction schema
    pub product_schema: ProductSchema,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            qa_url_patterns: Vec::new(),
            product_schema: ProductSchema::default(),
        }
    }
}

/// Indexer options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Maximum estimated tokens per chunk
    pub chunk_max_tokens: usize,

    /// Sentence boundary markers, applied in order
    pub sentence_splitters: Vec<String>,

    /// Chunks per embed/upsert call
    pub batch_size: usize,

    /// Maximum upsert attempts per batch
    pub max_retries: u32,

    /// Retry delay policy for upserts
    pub backoff: BackoffPolicy,

    /// External vector service endpoints for the default backend
    pub vector_service: Option<VectorServiceConfig>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunk_max_tokens: 256,
            sentence_splitters: vec![
                ". ".to_string(),
                "! ".to_string(),
                "? ".to_string(),
                "\n".to_string(),
            ],
            batch_size: 16,
            max_retries: 3,
            backoff: BackoffPolicy::Exponential {
                base_ms: 1000,
                max_ms: 10_000,
            },
            vector_service: None,
        }
    }
}

impl SiteConfig {
    /// Load configuration from a defaults file plus an optional per-site
    /// overlay, applying the shallow top-level merge. CLI overrides are
    /// applied by the caller before `validate`.
    pub fn load(default_path: &Path, site_path: Option<&Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(default_path)?;
        let mut root: serde_yaml::Value = serde_yaml::from_str(&text)?;

        if let Some(path) = site_path {
            let overlay_text = std::fs::read_to_string(path)?;
            let overlay: serde_yaml::Value = serde_yaml::from_str(&overlay_text)?;
            merge_top_level(&mut root, overlay)?;
        }

        let config: SiteConfig = serde_yaml::from_value(root)?;
        Ok(config)
    }

    /// Check run-fatal configuration errors
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site_url.is_empty() {
            return Err(ConfigError::Invalid("site_url is required".to_string()));
        }
        url::Url::parse(&self.site_url)
            .map_err(|e| ConfigError::Invalid(format!("site_url: {}", e)))?;
        if self.fetch.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "fetch.concurrency must be at least 1".to_string(),
            ));
        }
        if self.fetch.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "fetch.max_retries must be at least 1".to_string(),
            ));
        }
        if self.indexer.chunk_max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "indexer.chunk_max_tokens must be at least 1".to_string(),
            ));
        }
        if self.indexer.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "indexer.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-site state directory under the data root
    pub fn site_dir(&self) -> PathBuf {
        let domain = url::Url::parse(&self.site_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| "site".to_string());
        self.data_dir.join(domain)
    }
}

fn merge_top_level(
    base: &mut serde_yaml::Value,
    overlay: serde_yaml::Value,
) -> Result<(), ConfigError> {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base), serde_yaml::Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                base.insert(key, value);
            }
            Ok(())
        }
        _ => Err(ConfigError::Invalid(
            "configuration files must be YAML mappings".to_string(),
        )),
    }
}
