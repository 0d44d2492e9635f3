//! Token counting for pre-call cost estimation.
//!
//! Uses tiktoken's cl100k_base encoding for every model. Anthropic models
//! tokenize differently, but the count is only used to estimate a cost
//! ceiling before the call, not to bill it.

use once_cell::sync::Lazy;

use crate::error::{Error, Result};
use crate::models::CompletionRequest;

/// Per-message overhead for role and separator tokens in chat formats.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Trait for tokenization operations.
pub trait Tokenizer: Send + Sync {
    /// Count the number of tokens in the given text.
    fn count_tokens(&self, text: &str) -> usize;

    /// Get the name/identifier of this tokenizer.
    fn name(&self) -> &str;
}

/// Tiktoken-based tokenizer.
pub struct TiktokenTokenizer {
    bpe: tiktoken_rs::CoreBPE,
    name: String,
}

impl TiktokenTokenizer {
    /// Create a tokenizer using the cl100k_base encoding.
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| Error::Internal(format!("Failed to initialize cl100k_base: {}", e)))?;

        Ok(Self {
            bpe,
            name: "cl100k_base".to_string(),
        })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Shared tokenizer. `None` if the BPE tables failed to load, in which case
/// callers fall back to [`estimate_tokens`].
static SHARED: Lazy<Option<TiktokenTokenizer>> = Lazy::new(|| match TiktokenTokenizer::cl100k() {
    Ok(t) => Some(t),
    Err(e) => {
        tracing::warn!(error = %e, "Tokenizer unavailable, using character estimate");
        None
    }
});

/// Count tokens in `text`, estimating when the tokenizer is unavailable.
pub fn count_tokens(text: &str) -> usize {
    match SHARED.as_ref() {
        Some(t) => t.count_tokens(text),
        None => estimate_tokens(text),
    }
}

/// Prompt tokens of a chat request, including per-message overhead.
pub fn count_prompt_tokens(request: &CompletionRequest) -> usize {
    request
        .messages
        .iter()
        .map(|m| count_tokens(&m.content) + MESSAGE_OVERHEAD_TOKENS)
        .sum()
}

/// Quickly estimate token count without full tokenization.
///
/// Uses a heuristic ratio of ~3.7 characters per token for English text.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() as f32 / 3.7).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;

    const SIMPLE_ENGLISH: &str = "The quick brown fox jumps over the lazy dog.";
    const JOB_POSTING: &str = r#"
        We are hiring a Senior Backend Engineer to build payment infrastructure.
        You will own services written in Rust and Go, deployed on Kubernetes.
        Requirements: 5+ years of experience, strong SQL, distributed systems.
    "#;

    #[test]
    fn test_cl100k_initialization() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        assert_eq!(tokenizer.name(), "cl100k_base");
    }

    #[test]
    fn test_count_tokens_simple_english() {
        let count = count_tokens(SIMPLE_ENGLISH);
        assert!(count > 5 && count < 20, "got {}", count);
    }

    #[test]
    fn test_count_tokens_empty_string() {
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn test_estimate_tokens_vs_actual() {
        let actual = count_tokens(JOB_POSTING) as f64;
        let estimated = estimate_tokens(JOB_POSTING) as f64;
        let ratio = estimated / actual;
        assert!(ratio > 0.5 && ratio < 2.0, "ratio {}", ratio);
    }

    #[test]
    fn test_estimate_tokens_single_char() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_prompt_tokens_include_overhead() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(""),
            ChatMessage::user(""),
        ]);
        assert_eq!(count_prompt_tokens(&request), 2 * MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn test_prompt_tokens_grow_with_content() {
        let short = CompletionRequest::new(vec![ChatMessage::user("Tailor my CV.")]);
        let long = CompletionRequest::new(vec![ChatMessage::user(JOB_POSTING)]);
        assert!(count_prompt_tokens(&long) > count_prompt_tokens(&short));
    }

    #[test]
    fn test_tokenizer_thread_safety() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| count_tokens(SIMPLE_ENGLISH)))
            .collect();
        let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(counts.windows(2).all(|w| w[0] == w[1]));
    }
}
