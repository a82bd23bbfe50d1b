//! Sentence-boundary text chunking bounded by an estimated token count.
//!
//! Text is split at the configured sentence markers, then sentences are
//! packed greedily so that every chunk's token estimate stays at or below
//! the configured maximum. A sentence that alone exceeds the budget is
//! windowed by characters. The split is deterministic: identical input
//! always yields identical chunks in the same order.

use crate::config::IndexerConfig;

/// Estimated token count of a text: one token per four characters,
/// rounded up. An estimate is all chunk budgeting needs.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Splits text into token-bounded chunks at sentence boundaries
#[derive(Debug, Clone)]
pub struct TextChunker {
    splitters: Vec<String>,
    max_tokens: usize,
}

impl TextChunker {
    pub fn new(splitters: Vec<String>, max_tokens: usize) -> Self {
        Self {
            splitters,
            max_tokens: max_tokens.max(1),
        }
    }

    pub fn from_config(config: &IndexerConfig) -> Self {
        Self::new(config.sentence_splitters.clone(), config.chunk_max_tokens)
    }

    fn split_sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = vec![text.to_string()];
        for splitter in &self.splitters {
            sentences = sentences
                .iter()
                .flat_map(|s| s.split(splitter.as_str()))
                .map(String::from)
                .collect();
        }
        sentences
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Split text into chunks, each with a token estimate at or below the
    /// configured maximum
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let max_chars = self.max_tokens * 4;
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_chars = 0usize;

        for sentence in self.split_sentences(text) {
            let sentence_chars = sentence.chars().count();

            if sentence_chars > max_chars {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                    current_chars = 0;
                }
                chunks.extend(window_by_chars(&sentence, max_chars));
                continue;
            }

            // The joining space counts toward the estimate, so the bound
            // holds for the assembled chunk, not just the sentence sum.
            let prospective = if current.is_empty() {
                sentence_chars
            } else {
                current_chars + 1 + sentence_chars
            };
            if !current.is_empty() && prospective > max_chars {
                chunks.push(std::mem::take(&mut current));
                current = sentence;
                current_chars = sentence_chars;
            } else {
                if !current.is_empty() {
                    current.push(' ');
                    current_chars += 1;
                }
                current.push_str(&sentence);
                current_chars += sentence_chars;
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

fn window_by_chars(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|window| window.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_chunker(max_tokens: usize) -> TextChunker {
        TextChunker::new(
            vec![
                ". ".to_string(),
                "! ".to_string(),
                "? ".to_string(),
                "\n".to_string(),
            ],
            max_tokens,
        )
    }

    #[test]
    fn test_every_chunk_respects_the_token_bound() {
        let text = "Shipping takes three to five business days. Returns are accepted \
                    within thirty days of delivery! Do you ship internationally? Yes, \
                    we ship to over forty countries.\nContact support for more details. \
                    Our warehouse processes orders every weekday morning.";
        let chunker = default_chunker(10);

        let chunks = chunker.chunk_text(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(
                estimate_tokens(chunk) <= 10,
                "chunk over budget: {:?}",
                chunk
            );
        }
    }

    #[test]
    fn test_concatenation_reconstructs_text_minus_boundaries() {
        let text = "First sentence. Second sentence. Third sentence.";
        let chunks = default_chunker(8).chunk_text(text);

        let strip = |s: &str| {
            s.chars()
                .filter(|c| !c.is_whitespace() && *c != '.' && *c != '!' && *c != '?')
                .collect::<String>()
        };
        let rejoined: String = chunks.iter().map(|c| strip(c)).collect();
        assert_eq!(rejoined, strip(text));
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota kappa.";
        let chunker = default_chunker(6);
        assert_eq!(chunker.chunk_text(text), chunker.chunk_text(text));
    }

    #[test]
    fn test_oversize_sentence_is_windowed() {
        let long_word = "x".repeat(100);
        let chunker = default_chunker(5);

        let chunks = chunker.chunk_text(&long_word);
        assert_eq!(chunks.len(), 5);
        for chunk in &chunks {
            assert!(estimate_tokens(chunk) <= 5);
        }
        assert_eq!(chunks.concat(), long_word);
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        let chunker = default_chunker(10);
        assert!(chunker.chunk_text("").is_empty());
        assert!(chunker.chunk_text("   \n  ").is_empty());
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
