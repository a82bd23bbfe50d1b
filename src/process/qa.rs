//! Q&A generation for document pages.
//!
//! Documents whose URL matches the configured pattern set get a second
//! extraction pass that turns the cleaned text into question/answer pairs.
//! The generator is an external capability; this module only defines the
//! contract and validates its output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::ProcessError;

/// One generated question/answer pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn is_valid(&self) -> bool {
        !self.question.trim().is_empty() && !self.answer.trim().is_empty()
    }
}

/// Capability for generating Q&A pairs from cleaned text
#[async_trait]
pub trait QaGenerator: Send + Sync {
    async fn generate_qa(&self, text: &str) -> Result<Vec<QaPair>, ProcessError>;
}

/// Drop malformed pairs from a generator response
pub fn valid_pairs(pairs: Vec<QaPair>) -> Vec<QaPair> {
    pairs.into_iter().filter(QaPair::is_valid).collect()
}

/// Generator for runs without a Q&A backend; produces no pairs
#[derive(Debug, Default)]
pub struct DisabledQa;

#[async_trait]
impl QaGenerator for DisabledQa {
    async fn generate_qa(&self, _text: &str) -> Result<Vec<QaPair>, ProcessError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_pairs_filters_empties() {
        let pairs = vec![
            QaPair {
                question: "How long does shipping take?".to_string(),
                answer: "3-5 business days.".to_string(),
            },
            QaPair {
                question: "  ".to_string(),
                answer: "orphan answer".to_string(),
            },
            QaPair {
                question: "unanswered".to_string(),
                answer: String::new(),
            },
        ];

        let valid = valid_pairs(pairs);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].question, "How long does shipping take?");
    }

    #[tokio::test]
    async fn test_disabled_qa_returns_nothing() {
        let pairs = DisabledQa.generate_qa("some text").await.unwrap();
        assert!(pairs.is_empty());
    }
}
