//! Token-windowed conversation memory

use crate::context::token_estimator::{TokenEstimator, DEFAULT_MODEL_FAMILY};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// One completed request/response pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub human: String,
    pub ai: String,
    tokens: usize,
}

impl Exchange {
    pub fn tokens(&self) -> usize {
        self.tokens
    }
}

/// Completed exchanges, oldest first, kept under a token limit.
///
/// Only whole exchanges are stored. A response that never completes is
/// never recorded.
pub struct ConversationMemory {
    exchanges: VecDeque<Exchange>,
    max_tokens: usize,
    total_tokens: usize,
    estimator: Arc<dyn TokenEstimator>,
}

/// Memory handle shared between successive invokers
pub type SharedMemory = Arc<Mutex<ConversationMemory>>;

impl ConversationMemory {
    pub fn new(max_tokens: usize, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            exchanges: VecDeque::new(),
            max_tokens,
            total_tokens: 0,
            estimator,
        }
    }

    pub fn shared(max_tokens: usize, estimator: Arc<dyn TokenEstimator>) -> SharedMemory {
        Arc::new(Mutex::new(Self::new(max_tokens, estimator)))
    }

    /// Store a completed exchange, pruning the oldest ones over the limit
    pub fn record(&mut self, human: impl Into<String>, ai: impl Into<String>) {
        let human = human.into();
        let ai = ai.into();
        let tokens = self.estimator.estimate(&human, DEFAULT_MODEL_FAMILY)
            + self.estimator.estimate(&ai, DEFAULT_MODEL_FAMILY);

        self.exchanges.push_back(Exchange { human, ai, tokens });
        self.total_tokens += tokens;

        // the newest exchange always stays, even if it alone is over the limit
        while self.total_tokens > self.max_tokens && self.exchanges.len() > 1 {
            if let Some(dropped) = self.exchanges.pop_front() {
                self.total_tokens -= dropped.tokens;
                debug!("Pruned exchange of {} tokens from memory", dropped.tokens);
            }
        }
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Transcript for the `{chat_history}` placeholder
    pub fn render(&self) -> String {
        self.exchanges
            .iter()
            .map(|e| format!("Human: {}\nAI: {}", e.human, e.ai))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
        self.total_tokens = 0;
    }
}

impl std::fmt::Debug for ConversationMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMemory")
            .field("exchanges", &self.exchanges.len())
            .field("total_tokens", &self.total_tokens)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WordBasedEstimator;

    struct CharEstimator;

    impl TokenEstimator for CharEstimator {
        fn estimate(&self, text: &str, _model_family: &str) -> usize {
            text.len()
        }
    }

    #[test]
    fn test_record_and_render() {
        let mut memory = ConversationMemory::new(1000, Arc::new(WordBasedEstimator::default()));
        memory.record("hello", "hi there");
        memory.record("explain", "sure");

        assert_eq!(memory.len(), 2);
        assert_eq!(memory.render(), "Human: hello\nAI: hi there\nHuman: explain\nAI: sure");
    }

    #[test]
    fn test_oldest_pruned_over_limit() {
        let mut memory = ConversationMemory::new(10, Arc::new(CharEstimator));
        memory.record("aaa", "aa"); // 5
        memory.record("bbb", "bb"); // 10
        assert_eq!(memory.len(), 2);

        memory.record("c", "c"); // 12 -> drop first
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.total_tokens(), 7);
        assert_eq!(memory.exchanges().next().unwrap().human, "bbb");
    }

    #[test]
    fn test_oversized_exchange_kept_alone() {
        let mut memory = ConversationMemory::new(4, Arc::new(CharEstimator));
        memory.record("a", "b");
        memory.record("long question", "long answer");
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.exchanges().next().unwrap().ai, "long answer");
    }

    #[test]
    fn test_clear() {
        let mut memory = ConversationMemory::new(100, Arc::new(CharEstimator));
        memory.record("a", "b");
        memory.clear();
        assert!(memory.is_empty());
        assert_eq!(memory.total_tokens(), 0);
        assert_eq!(memory.render(), "");
    }
}
