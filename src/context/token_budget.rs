//! Request sizing and estimate compensation
//!
//! A request is sized as:
//! - Prompt template tokens
//! - Context bundle tokens
//! - A fixed allowance for conversation memory
//!
//! The total is then inflated by the compensation factor before it is
//! compared against a tier's capacity, because the estimator can
//! undercount relative to the provider's own tokenizer.

use super::token_estimator::TokenEstimator;
use crate::config::BudgetConfig;
use crate::error::{Result, SidekickError};
use serde::{Deserialize, Serialize};

/// Breakdown of an estimated request size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSize {
    pub prompt_tokens: usize,
    pub context_tokens: usize,
    pub memory_tokens: usize,
}

impl RequestSize {
    /// Raw (uncompensated) total
    pub fn total(&self) -> usize {
        self.prompt_tokens + self.context_tokens + self.memory_tokens
    }
}

/// Token budget policy
#[derive(Debug, Clone)]
pub struct TokenBudget {
    compensation_factor: f64,
    memory_overhead_tokens: usize,
}

impl TokenBudget {
    /// Create a budget; the factor must be at least 1.0
    pub fn new(compensation_factor: f64, memory_overhead_tokens: usize) -> Result<Self> {
        if compensation_factor.is_nan() || compensation_factor < 1.0 {
            return Err(SidekickError::Configuration(format!(
                "compensation factor must be >= 1.0, got {}",
                compensation_factor
            )));
        }

        Ok(Self {
            compensation_factor,
            memory_overhead_tokens,
        })
    }

    pub fn from_config(config: &BudgetConfig) -> Result<Self> {
        Self::new(config.compensation_factor, config.memory_overhead_tokens)
    }

    pub fn compensation_factor(&self) -> f64 {
        self.compensation_factor
    }

    /// Inflate an estimate by the compensation factor (truncating)
    pub fn compensate(&self, tokens: usize) -> usize {
        (tokens as f64 * self.compensation_factor).floor() as usize
    }

    /// Whether an estimate still fits `max_tokens` after compensation
    pub fn fits(&self, tokens: usize, max_tokens: usize) -> bool {
        self.compensate(tokens) <= max_tokens
    }

    /// Size a request from its prompt template and context text
    pub fn request_size(
        &self,
        estimator: &dyn TokenEstimator,
        model_family: &str,
        prompt_template: &str,
        context: &str,
    ) -> RequestSize {
        RequestSize {
            prompt_tokens: estimator.estimate(prompt_template, model_family),
            context_tokens: estimator.estimate(context, model_family),
            memory_tokens: self.memory_overhead_tokens,
        }
    }
}
