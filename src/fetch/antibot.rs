//! Anti-bot block detection.
//!
//! A block is a response the site's bot protection rejected rather than a
//! normal success or failure. The heuristic is site-specific, so it is a
//! configured predicate: a status-code set plus body regex patterns.

use std::collections::HashSet;

use regex::Regex;

use super::error::FetchError;
use crate::config::FetchConfig;

/// Configured predicate deciding whether a response is an anti-bot block
#[derive(Debug)]
pub struct BlockDetector {
    status_codes: HashSet<u16>,
    patterns: Vec<Regex>,
}

impl BlockDetector {
    pub fn new(status_codes: &[u16], patterns: &[String]) -> Result<Self, FetchError> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            status_codes: status_codes.iter().copied().collect(),
            patterns,
        })
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::new(&config.block_status_codes, &config.block_patterns)
    }

    /// True if the status is in the configured set or the body matches any
    /// configured signature pattern
    pub fn is_blocked(&self, status: u16, body: &str) -> bool {
        if self.status_codes.contains(&status) {
            return true;
        }
        self.patterns.iter().any(|p| p.is_match(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_block() {
        let detector = BlockDetector::new(&[403, 429], &[]).unwrap();
        assert!(detector.is_blocked(403, "forbidden"));
        assert!(detector.is_blocked(429, ""));
        assert!(!detector.is_blocked(200, "ok"));
        assert!(!detector.is_blocked(500, "server error"));
    }

    #[test]
    fn test_content_signature_block() {
        let detector =
            BlockDetector::new(&[], &["(?i)are you a robot".to_string()]).unwrap();
        assert!(detector.is_blocked(200, "Please verify: Are You A Robot?"));
        assert!(!detector.is_blocked(200, "<html>normal page</html>"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(BlockDetector::new(&[], &["[unclosed".to_string()]).is_err());
    }
}
