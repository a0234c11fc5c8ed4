//! Pluggable token counting for budget allocation.
//!
//! Provides a `Tokenizer` trait with two implementations: `BytesEstimateTokenizer`
//! (fast chars/4 heuristic, no dependencies) and `TiktokenTokenizer` (accurate BPE
//! counting, feature-gated behind `tiktoken`).

use std::sync::Arc;

pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
    fn name(&self) -> &str;
}

/// Default: chars/4 estimation (fast, no dependencies), per the assembler's budget model.
pub struct BytesEstimateTokenizer;

impl Tokenizer for BytesEstimateTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
    fn name(&self) -> &str {
        "chars-estimate"
    }
}

/// Tiktoken-based tokenizer (requires `tiktoken` feature).
#[cfg(feature = "tiktoken")]
pub struct TiktokenTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tiktoken")]
impl TiktokenTokenizer {
    pub fn new() -> Self {
        Self { bpe: tiktoken_rs::cl100k_base().unwrap() }
    }
}

#[cfg(feature = "tiktoken")]
impl Default for TiktokenTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "tiktoken")]
impl Tokenizer for TiktokenTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
    fn name(&self) -> &str {
        "tiktoken"
    }
}

/// Create a tokenizer by name. Falls back to chars-estimate for unknown names.
pub fn create_tokenizer(name: &str) -> Arc<dyn Tokenizer> {
    match name {
        #[cfg(feature = "tiktoken")]
        "tiktoken" => Arc::new(TiktokenTokenizer::new()),
        _ => Arc::new(BytesEstimateTokenizer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_estimate_is_roughly_chars_over_four() {
        let t = BytesEstimateTokenizer;
        assert_eq!(t.count_tokens(""), 0);
        assert_eq!(t.count_tokens("abcd"), 1);
        assert_eq!(t.count_tokens("abcde"), 2);
    }

    #[test]
    fn create_tokenizer_falls_back_for_unknown_name() {
        let t = create_tokenizer("nonexistent");
        assert_eq!(t.name(), "chars-estimate");
    }
}
