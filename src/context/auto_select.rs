//! Automatic file selection from current changes and recent commits

use super::git::VersionControl;
use super::git_context::GitContextBuilder;
use super::models::{ChangeStatus, RepoFileRef};
use super::token_estimator::TokenEstimator;
use crate::error::Result;
use indexmap::IndexSet;
use std::sync::Arc;
use tracing::{debug, info};

/// How many recent commits contribute candidates
pub const RECENT_COMMIT_DEPTH: usize = 5;

/// Limits for automatic selection
#[derive(Debug, Clone, Copy)]
pub struct AutoSelectLimits {
    /// Total estimated tokens across all selected files
    pub ceiling_tokens: usize,
    /// Any single file above this is skipped
    pub max_file_tokens: usize,
}

/// Pick files for context: current changes first, then recently committed files.
///
/// Files are accepted in order while the running total stays within the
/// ceiling; deleted, unreadable and oversized files are skipped.
pub fn auto_file_context(
    builder: &GitContextBuilder,
    estimator: &dyn TokenEstimator,
    model_family: &str,
    limits: AutoSelectLimits,
) -> Result<Vec<RepoFileRef>> {
    let vcs = builder.vcs();
    let base = builder.diff_base()?;

    let mut candidates: IndexSet<RepoFileRef> = IndexSet::new();
    for change in vcs.changed_files(base, &[])? {
        if change.status != ChangeStatus::Deleted {
            candidates.insert(change.path);
        }
    }
    candidates.extend(recent_files(vcs.as_ref()));

    let mut selected = Vec::new();
    let mut total = 0usize;

    for path in candidates {
        let Ok(content) = vcs.read_file(&path) else {
            debug!("Skipping {}: not readable as text", path);
            continue;
        };

        let tokens = estimator.estimate(&content, model_family);
        if tokens > limits.max_file_tokens {
            debug!("Skipping {}: {} tokens exceeds per-file limit", path, tokens);
            continue;
        }
        if total + tokens > limits.ceiling_tokens {
            debug!("Skipping {}: would exceed context ceiling", path);
            continue;
        }

        total += tokens;
        selected.push(path);
    }

    info!("Auto-selected {} files ({} tokens)", selected.len(), total);
    Ok(selected)
}

/// Source of a fresh automatic file selection
pub trait FileSelector: Send + Sync {
    fn select(&self) -> Result<Vec<RepoFileRef>>;
}

/// [`auto_file_context`] bound to its collaborators
pub struct AutoSelector {
    builder: GitContextBuilder,
    estimator: Arc<dyn TokenEstimator>,
    model_family: String,
    limits: AutoSelectLimits,
}

impl AutoSelector {
    pub fn new(
        builder: GitContextBuilder,
        estimator: Arc<dyn TokenEstimator>,
        model_family: impl Into<String>,
        limits: AutoSelectLimits,
    ) -> Self {
        Self {
            builder,
            estimator,
            model_family: model_family.into(),
            limits,
        }
    }

    pub fn limits(&self) -> AutoSelectLimits {
        self.limits
    }
}

impl FileSelector for AutoSelector {
    fn select(&self) -> Result<Vec<RepoFileRef>> {
        auto_file_context(&self.builder, self.estimator.as_ref(), &self.model_family, self.limits)
    }
}

fn recent_files(vcs: &dyn VersionControl) -> Vec<RepoFileRef> {
    // A repository without commits has no history to draw from.
    vcs.recent_commit_files(RECENT_COMMIT_DEPTH).unwrap_or_else(|e| {
        debug!("No recent commit files: {}", e);
        Vec::new()
    })
}
