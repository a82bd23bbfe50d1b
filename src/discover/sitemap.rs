//! Sitemap XML parsing.
//!
//! A sitemap document is either an index (listing other sitemaps) or a URL
//! set. The root element decides which; entries missing a `<loc>` are
//! reported as skipped rather than failing the document.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use quick_xml::events::Event;
use serde::Deserialize;

use super::error::DiscoverError;

/// One `<url>` entry from a URL-set sitemap
#[derive(Debug, Clone)]
pub struct SitemapEntry {
    pub loc: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub priority: Option<f32>,
    pub changefreq: Option<String>,
}

/// A parsed sitemap document
#[derive(Debug)]
pub enum SitemapDoc {
    /// Sitemap index: child sitemap URLs
    Index(Vec<String>),

    /// URL set: page entries plus the count of malformed entries skipped
    Urls {
        entries: Vec<SitemapEntry>,
        skipped: usize,
    },
}

#[derive(Debug, Deserialize)]
struct SitemapIndexDoc {
    #[serde(rename = "sitemap", default)]
    sitemaps: Vec<ChildRef>,
}

#[derive(Debug, Deserialize)]
struct ChildRef {
    #[serde(default)]
    loc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UrlSetDoc {
    #[serde(rename = "url", default)]
    urls: Vec<UrlEntryXml>,
}

#[derive(Debug, Deserialize)]
struct UrlEntryXml {
    #[serde(default)]
    loc: Option<String>,
    #[serde(default)]
    lastmod: Option<String>,
    #[serde(default)]
    priority: Option<f32>,
    #[serde(default)]
    changefreq: Option<String>,
}

/// Parse a sitemap document, deciding index vs URL set by its root element
pub fn parse_sitemap(xml: &str) -> Result<SitemapDoc, DiscoverError> {
    match root_element(xml)?.as_str() {
        "sitemapindex" => {
            let doc: SitemapIndexDoc = quick_xml::de::from_str(xml)?;
            let children = doc
                .sitemaps
                .into_iter()
                .filter_map(|child| child.loc)
                .map(|loc| loc.trim().to_string())
                .filter(|loc| !loc.is_empty())
                .collect();
            Ok(SitemapDoc::Index(children))
        }
        "urlset" => {
            let doc: UrlSetDoc = quick_xml::de::from_str(xml)?;
            let mut entries = Vec::new();
            let mut skipped = 0;
            for entry in doc.urls {
                let Some(loc) = entry.loc.filter(|l| !l.trim().is_empty()) else {
                    skipped += 1;
                    continue;
                };
                entries.push(SitemapEntry {
                    loc: loc.trim().to_string(),
                    last_modified: entry.lastmod.as_deref().and_then(parse_lastmod),
                    priority: entry.priority,
                    changefreq: entry.changefreq,
                });
            }
            Ok(SitemapDoc::Urls { entries, skipped })
        }
        other => Err(DiscoverError::Malformed(format!(
            "unexpected root element <{}>",
            other
        ))),
    }
}

fn root_element(xml: &str) -> Result<String, DiscoverError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name();
                return Ok(String::from_utf8_lossy(name.as_ref()).into_owned());
            }
            Event::Eof => {
                return Err(DiscoverError::Malformed("no root element".to_string()));
            }
            _ => {}
        }
    }
}

/// Parse a `<lastmod>` value, accepting RFC 3339 timestamps and plain dates
pub fn parse_lastmod(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sitemap_index() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://example.com/sitemap_products_1.xml</loc></sitemap>
  <sitemap><loc>https://example.com/sitemap_pages_1.xml</loc></sitemap>
</sitemapindex>"#;

        match parse_sitemap(xml).unwrap() {
            SitemapDoc::Index(children) => {
                assert_eq!(
                    children,
                    vec![
                        "https://example.com/sitemap_products_1.xml",
                        "https://example.com/sitemap_pages_1.xml",
                    ]
                );
            }
            _ => panic!("expected a sitemap index"),
        }
    }

    #[test]
    fn test_parse_urlset_with_nested_entries() {
        // Shopify-style entries carry nested image elements, which must not
        // break parsing of the fields we care about.
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
        xmlns:image="http://www.google.com/schemas/sitemap-image/1.1">
  <url>
    <loc>https://example.com/products/sugoi-chair</loc>
    <lastmod>2025-01-29T13:04:46-08:00</lastmod>
    <changefreq>daily</changefreq>
    <image:image>
      <image:loc>https://cdn.example.com/chair.gif</image:loc>
      <image:title>Sugoi Chair</image:title>
    </image:image>
  </url>
  <url>
    <loc>https://example.com/pages/faq</loc>
    <lastmod>2025-01-15</lastmod>
    <priority>0.5</priority>
  </url>
</urlset>"#;

        match parse_sitemap(xml).unwrap() {
            SitemapDoc::Urls { entries, skipped } => {
                assert_eq!(skipped, 0);
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].loc, "https://example.com/products/sugoi-chair");
                assert!(entries[0].last_modified.is_some());
                assert_eq!(entries[0].changefreq.as_deref(), Some("daily"));
                assert_eq!(entries[1].priority, Some(0.5));
                assert!(entries[1].last_modified.is_some());
            }
            _ => panic!("expected a urlset"),
        }
    }

    #[test]
    fn test_entries_without_loc_are_skipped() {
        let xml = r#"<urlset>
  <url><lastmod>2025-01-01</lastmod></url>
  <url><loc>https://example.com/a</loc></url>
</urlset>"#;

        match parse_sitemap(xml).unwrap() {
            SitemapDoc::Urls { entries, skipped } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(skipped, 1);
            }
            _ => panic!("expected a urlset"),
        }
    }

    #[test]
    fn test_non_sitemap_document_is_rejected() {
        let result = parse_sitemap("<html><body>not a sitemap</body></html>");
        assert!(matches!(result, Err(DiscoverError::Malformed(_))));
    }

    #[test]
    fn test_parse_lastmod_formats() {
        assert!(parse_lastmod("2025-01-29T13:04:46-08:00").is_some());
        assert!(parse_lastmod("2025-01-15").is_some());
        assert!(parse_lastmod("yesterday").is_none());
    }
}
