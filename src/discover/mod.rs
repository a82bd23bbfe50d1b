//! Sitemap discoverer module
//!
//! This module resolves a site root into a complete URL record set:
//! robots.txt gives the sitemap directives, sitemap indexes are followed to
//! their leaf URL sets, and the extracted entries are normalized,
//! classified and merged into the metadata store.

mod error;
mod robots;
mod sitemap;

pub use error::DiscoverError;
pub use robots::sitemap_directives;
pub use sitemap::{SitemapDoc, SitemapEntry, parse_lastmod, parse_sitemap};

use std::collections::{BTreeMap, HashSet, VecDeque};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{DiscoveryConfig, FetchConfig};
use crate::fetch::{FetchOptions, Fetcher};
use crate::metadata::{DiscoveredUrl, MetadataStore, PageType};

/// Counts for one discovery run
#[derive(Debug, Default, Clone, Serialize)]
pub struct DiscoveryReport {
    pub urls_discovered: usize,
    pub products: usize,
    pub documents: usize,
    pub sitemaps_parsed: usize,
    pub entries_skipped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

/// Normalize a URL for deduplication: scheme and host lowercased, query
/// string and fragment dropped, trailing slash stripped except at the root
pub fn normalize_url(raw: &str) -> Result<String, url::ParseError> {
    let mut parsed = Url::parse(raw.trim())?;
    parsed.set_query(None);
    parsed.set_fragment(None);
    let normalized = parsed.to_string();
    if normalized.ends_with('/') && parsed.path() != "/" {
        Ok(normalized.trim_end_matches('/').to_string())
    } else {
        Ok(normalized)
    }
}

/// Classify a URL by the configured product path prefixes
pub fn classify(url: &str, product_prefixes: &[String]) -> PageType {
    if product_prefixes.iter().any(|p| url.contains(p.as_str())) {
        PageType::Product
    } else {
        PageType::Document
    }
}

/// Discover the site's URLs and merge them into the metadata store.
///
/// Individual sitemap failures are collected in the report; the run only
/// fails if robots.txt is unusable or no sitemap could be parsed at all.
#[instrument(skip_all, fields(site = site_url))]
pub async fn discover_site(
    fetcher: &dyn Fetcher,
    store: &MetadataStore,
    config: &DiscoveryConfig,
    fetch_config: &FetchConfig,
    site_url: &str,
) -> Result<DiscoveryReport, DiscoverError> {
    let allow_patterns = config
        .sitemap_allow_patterns
        .iter()
        .map(|p| Regex::new(p))
        .collect::<Result<Vec<_>, _>>()?;

    let robots_url = Url::parse(site_url)?.join("/robots.txt")?;
    info!("Fetching {}", robots_url);
    let options = FetchOptions::direct(fetch_config);
    let response = fetcher.fetch(robots_url.as_str(), &options).await?;
    if !response.is_success() {
        return Err(DiscoverError::NoSitemaps(format!(
            "robots.txt returned HTTP {}",
            response.status
        )));
    }

    let directives = sitemap_directives(&response.body);
    if directives.is_empty() {
        return Err(DiscoverError::NoSitemaps(
            "robots.txt has no Sitemap directives".to_string(),
        ));
    }
    info!("Found {} sitemap directives", directives.len());

    let mut report = DiscoveryReport::default();
    let mut candidates: BTreeMap<String, DiscoveredUrl> = BTreeMap::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, usize)> =
        directives.into_iter().map(|url| (url, 0)).collect();

    while let Some((sitemap_url, depth)) = queue.pop_front() {
        if !visited.insert(sitemap_url.clone()) {
            continue;
        }

        debug!("Fetching sitemap {} (depth {})", sitemap_url, depth);
        let response = match fetcher.fetch(&sitemap_url, &options).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                report
                    .errors
                    .push(format!("{}: HTTP {}", sitemap_url, response.status));
                continue;
            }
            Err(e) => {
                report.errors.push(format!("{}: {}", sitemap_url, e));
                continue;
            }
        };

        match parse_sitemap(&response.body) {
            Ok(SitemapDoc::Index(children)) => {
                report.sitemaps_parsed += 1;
                if depth + 1 > config.max_sitemap_depth {
                    warn!(
                        "Sitemap depth limit reached at {}; not following {} children",
                        sitemap_url,
                        children.len()
                    );
                    continue;
                }
                for child in children {
                    let followed = allow_patterns.is_empty()
                        || allow_patterns.iter().any(|p| p.is_match(&child));
                    if followed {
                        queue.push_back((child, depth + 1));
                    } else {
                        debug!("Skipping filtered sitemap {}", child);
                    }
                }
            }
            Ok(SitemapDoc::Urls { entries, skipped }) => {
                report.sitemaps_parsed += 1;
                report.entries_skipped += skipped;
                for entry in entries {
                    let normalized = match normalize_url(&entry.loc) {
                        Ok(url) => url,
                        Err(e) => {
                            debug!("Skipping malformed URL {}: {}", entry.loc, e);
                            report.entries_skipped += 1;
                            continue;
                        }
                    };
                    let page_type = classify(&normalized, &config.product_path_prefixes);
                    candidates.entry(normalized.clone()).or_insert(DiscoveredUrl {
                        url: normalized,
                        last_modified: entry.last_modified,
                        priority: entry.priority,
                        changefreq: entry.changefreq,
                        page_type,
                    });
                }
            }
            Err(e) => {
                report.errors.push(format!("{}: {}", sitemap_url, e));
            }
        }
    }

    if report.sitemaps_parsed == 0 {
        return Err(DiscoverError::NoSitemaps(format!(
            "no sitemap could be parsed ({} errors)",
            report.errors.len()
        )));
    }

    let candidates: Vec<DiscoveredUrl> = candidates.into_values().collect();
    report.urls_discovered = candidates.len();
    for candidate in &candidates {
        match candidate.page_type {
            PageType::Product => report.products += 1,
            _ => report.documents += 1,
        }
    }

    let outcome = store.merge_discovered(&candidates);
    report.inserted = outcome.inserted;
    report.updated = outcome.updated;
    store
        .save()
        .await
        .map_err(|e| DiscoverError::Store(e.to_string()))?;

    info!(
        "Discovery finished: {} URLs ({} products, {} documents), {} inserted, {} errors",
        report.urls_discovered,
        report.products,
        report.documents,
        report.inserted,
        report.errors.len()
    );
    Ok(report)
}
