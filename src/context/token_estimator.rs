//! Token estimation using tiktoken

use crate::error::{Result, SidekickError};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tiktoken_rs::tokenizer::{get_tokenizer, Tokenizer};
use tiktoken_rs::{cl100k_base, p50k_base, r50k_base, CoreBPE};
use tracing::debug;

/// Model family used when the caller has no better idea
pub const DEFAULT_MODEL_FAMILY: &str = "gpt-4";

/// Token estimator trait for different tokenization strategies
///
/// Estimates are approximations; callers comparing them against a hard
/// model limit must apply a compensation factor first.
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in `text` for the given model family
    fn estimate(&self, text: &str, model_family: &str) -> usize;

    /// Estimate tokens for multiple texts
    fn estimate_batch(&self, texts: &[&str], model_family: &str) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t, model_family)).collect()
    }
}

/// Strip a gateway vendor prefix ("openai/gpt-4" -> "gpt-4")
pub fn model_family(model_name: &str) -> &str {
    model_name
        .rsplit_once('/')
        .map(|(_, name)| name)
        .unwrap_or(model_name)
}

/// Tiktoken-based estimator; cl100k_base is loaded eagerly, older encodings on demand
pub struct TiktokenEstimator {
    cl100k: Arc<CoreBPE>,
    p50k: OnceCell<Arc<CoreBPE>>,
    r50k: OnceCell<Arc<CoreBPE>>,
}

impl TiktokenEstimator {
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| SidekickError::Tokenizer(e.to_string()))?;
        Ok(Self {
            cl100k: Arc::new(bpe),
            p50k: OnceCell::new(),
            r50k: OnceCell::new(),
        })
    }

    fn bpe_for(&self, family: &str) -> Arc<CoreBPE> {
        let loaded = match get_tokenizer(model_family(family)) {
            Some(Tokenizer::P50kBase) | Some(Tokenizer::P50kEdit) => self
                .p50k
                .get_or_try_init(|| p50k_base().map(Arc::new))
                .ok()
                .cloned(),
            Some(Tokenizer::R50kBase) | Some(Tokenizer::Gpt2) => self
                .r50k
                .get_or_try_init(|| r50k_base().map(Arc::new))
                .ok()
                .cloned(),
            _ => None,
        };

        loaded.unwrap_or_else(|| Arc::clone(&self.cl100k))
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str, model_family: &str) -> usize {
        let count = self.bpe_for(model_family).encode_with_special_tokens(text).len();

        let preview: String = text.trim().chars().take(20).collect();
        debug!("Token length for {:?}...: {}", preview, count);

        count
    }
}

/// Word-based token estimator (fallback, ~1.3 tokens per word)
pub struct WordBasedEstimator {
    tokens_per_word: f64,
}

impl WordBasedEstimator {
    pub fn new(tokens_per_word: f64) -> Self {
        Self { tokens_per_word }
    }
}

impl Default for WordBasedEstimator {
    fn default() -> Self {
        Self::new(1.3)
    }
}

impl TokenEstimator for WordBasedEstimator {
    fn estimate(&self, text: &str, _model_family: &str) -> usize {
        let word_count = text.split_whitespace().count();
        (word_count as f64 * self.tokens_per_word).ceil() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiktoken_estimator() {
        let estimator = TiktokenEstimator::new().unwrap();
        let text = "Hello, world! This is a test.";
        let tokens = estimator.estimate(text, "gpt-4");
        assert!(tokens > 0);
        assert!(tokens < 20);
    }

    #[test]
    fn test_tiktoken_is_deterministic() {
        let estimator = TiktokenEstimator::new().unwrap();
        let text = "fn main() { println!(\"hi\"); }";
        assert_eq!(estimator.estimate(text, "gpt-4"), estimator.estimate(text, "gpt-4"));
    }

    #[test]
    fn test_gateway_prefix_uses_same_family() {
        let estimator = TiktokenEstimator::new().unwrap();
        let text = "The quick brown fox jumps over the lazy dog";
        assert_eq!(
            estimator.estimate(text, "openai/gpt-4"),
            estimator.estimate(text, "gpt-4")
        );
    }

    #[test]
    fn test_unknown_family_falls_back() {
        let estimator = TiktokenEstimator::new().unwrap();
        assert!(estimator.estimate("some text here", "mystery-model") > 0);
    }

    #[test]
    fn test_model_family() {
        assert_eq!(model_family("openai/gpt-4-32k"), "gpt-4-32k");
        assert_eq!(model_family("gpt-3.5-turbo"), "gpt-3.5-turbo");
    }

    #[test]
    fn test_word_based_estimator() {
        let estimator = WordBasedEstimator::default();
        let tokens = estimator.estimate("Hello world test", DEFAULT_MODEL_FAMILY);
        assert_eq!(tokens, 4); // 3 words * 1.3 = 3.9 -> 4
    }

    #[test]
    fn test_batch_estimation() {
        let estimator = TiktokenEstimator::new().unwrap();
        let tokens = estimator.estimate_batch(&["Hello", "world", "test"], "gpt-4");
        assert_eq!(tokens.len(), 3);
        assert!(tokens.iter().all(|&t| t > 0));
    }
}
