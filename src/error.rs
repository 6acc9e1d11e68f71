//! Error types for the sidekick session manager

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SidekickError>;

/// Errors raised while building context, choosing a model or running a turn
#[derive(Debug, Error)]
pub enum SidekickError {
    /// The versioning backend failed or a file referenced by the diff is missing
    #[error("Context build failed: {0}")]
    ContextBuild(String),

    /// No tier in the table can hold the (compensated) request size
    #[error("The context is too large ({required} tokens) for any available model")]
    TokenBudgetExceeded { required: usize },

    /// The provider exposes none of the configured tiers for this credential
    #[error("None of the {mode} models are available for this credential (request size {required} tokens)")]
    ModelUnavailable { required: usize, mode: String },

    /// The user cancelled the response mid-stream
    #[error("Response interrupted")]
    Interrupted,

    /// Session persistence or filesystem access failed unexpectedly
    #[error("Filesystem error: {0}")]
    FatalIo(String),

    #[error("Not inside a git repository: {0}")]
    NotARepository(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SidekickError {
    /// Whether the error only affects the current turn.
    ///
    /// Startup errors (no repository, bad configuration) are not; everything
    /// else is reported and the loop returns to waiting for input.
    pub fn is_turn_recoverable(&self) -> bool {
        !matches!(
            self,
            SidekickError::NotARepository(_) | SidekickError::Configuration(_)
        )
    }

    /// Shorthand for a versioning-backend failure
    pub fn git(command: impl AsRef<str>, stderr: impl AsRef<str>) -> Self {
        SidekickError::ContextBuild(format!(
            "git {} failed: {}",
            command.as_ref(),
            stderr.as_ref().trim()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_recoverable_classification() {
        assert!(SidekickError::Interrupted.is_turn_recoverable());
        assert!(SidekickError::TokenBudgetExceeded { required: 9000 }.is_turn_recoverable());
        assert!(SidekickError::FatalIo("disk full".into()).is_turn_recoverable());
        assert!(!SidekickError::NotARepository("/tmp".into()).is_turn_recoverable());
        assert!(!SidekickError::Configuration("bad".into()).is_turn_recoverable());
    }

    #[test]
    fn test_git_error_message() {
        let err = SidekickError::git("diff --cached", "fatal: bad revision\n");
        assert_eq!(
            err.to_string(),
            "Context build failed: git diff --cached failed: fatal: bad revision"
        );
    }

    #[test]
    fn test_budget_error_mentions_size() {
        let err = SidekickError::TokenBudgetExceeded { required: 40000 };
        assert!(err.to_string().contains("40000"));
    }
}
