//! Sidekick: an interactive coding assistant session manager
//!
//! Builds git-aware context for a set of repository files, sizes it against
//! a token budget, picks the smallest model tier that fits and runs a
//! resumable request loop against a chat-completion provider.

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod session;
pub mod sidekick;
pub mod tiers;

pub use config::SidekickConfig;
pub use error::{Result, SidekickError};
