//! Boilerplate removal for document pages.
//!
//! Strips recurring structural regions (scripts, styles, navigation, header,
//! footer), prefers the main content region when the page marks one, and
//! produces whitespace-normalized text plus the page title.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use ego_tree::NodeRef;
use scraper::{Html, Node, Selector};

use super::error::ProcessError;

/// Cleaned document output: title and primary text
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedDocument {
    pub title: String,
    pub clean_text: String,
}

/// Capability for boilerplate removal
#[async_trait]
pub trait DocumentCleaner: Send + Sync {
    async fn clean(&self, raw_html: &str) -> Result<CleanedDocument, ProcessError>;
}

/// HTML cleaner stripping structural boilerplate elements
#[derive(Debug, Clone)]
pub struct HtmlCleaner {
    excluded_elements: Vec<String>,
}

impl Default for HtmlCleaner {
    fn default() -> Self {
        Self {
            excluded_elements: [
                "script", "style", "nav", "header", "footer", "aside", "noscript",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl HtmlCleaner {
    pub fn new(excluded_elements: Vec<String>) -> Self {
        Self { excluded_elements }
    }

    fn collect_text(&self, node: NodeRef<'_, Node>, out: &mut String) {
        for child in node.children() {
            match child.value() {
                Node::Text(text) => {
                    out.push_str(&text.text);
                    out.push(' ');
                }
                Node::Element(element) => {
                    if !self
                        .excluded_elements
                        .iter()
                        .any(|name| name == element.name())
                    {
                        self.collect_text(child, out);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Collapse runs of whitespace and trim
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re.replace_all(text, " ").trim().to_string()
}

#[async_trait]
impl DocumentCleaner for HtmlCleaner {
    async fn clean(&self, raw_html: &str) -> Result<CleanedDocument, ProcessError> {
        let doc = Html::parse_document(raw_html);

        let title = Selector::parse("title")
            .ok()
            .and_then(|selector| {
                doc.select(&selector)
                    .next()
                    .map(|el| el.text().collect::<String>())
            })
            .map(|t| normalize_whitespace(&t))
            .unwrap_or_default();

        // Prefer an explicit main-content region, then the body, then the
        // whole document.
        let root = ["main", "article", "#content", "body"]
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .find_map(|selector| doc.select(&selector).next())
            .unwrap_or_else(|| doc.root_element());

        let mut text = String::new();
        self.collect_text(*root, &mut text);

        Ok(CleanedDocument {
            title,
            clean_text: normalize_whitespace(&text),
        })
    }
}
