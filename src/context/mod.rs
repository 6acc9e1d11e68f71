//! Repository context building with token-aware sizing
//!
//! This module turns git state and the active file set into the text the
//! model receives, and sizes that text against a token budget.

pub mod auto_select;
pub mod files;
pub mod git;
pub mod git_context;
pub mod models;
pub mod structure;
pub mod token_budget;
pub mod token_estimator;

pub use auto_select::{auto_file_context, AutoSelectLimits, AutoSelector, FileSelector};
pub use files::{files_context, identify_languages, resolve_repo_path};
pub use git::{GitCli, VersionControl};
pub use git_context::{GitContextBuilder, MIN_DIFF_CONTEXT_LINES};
pub use models::{ChangeStatus, ChangedPath, ContextBundle, DiffBase, DiffEntry, RepoFileRef};
pub use structure::{render_structure, IgnoreSet};
pub use token_budget::{RequestSize, TokenBudget};
pub use token_estimator::{model_family, TiktokenEstimator, TokenEstimator, WordBasedEstimator};
