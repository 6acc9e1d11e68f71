//! Versioning backend: the read-only git operations the context builder needs

use super::models::{ChangedPath, DiffBase, RepoFileRef};
use crate::error::{Result, SidekickError};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error};

/// Read-only view of a repository's change state
///
/// Every operation is synchronous and text-producing; a failing command
/// surfaces as [`SidekickError::ContextBuild`].
pub trait VersionControl: Send + Sync {
    /// Paths with staged changes
    fn staged_files(&self) -> Result<Vec<RepoFileRef>>;

    /// Paths that differ between the working tree and the index
    fn unstaged_files(&self) -> Result<Vec<RepoFileRef>>;

    /// Changed paths with status codes, optionally restricted to `paths`
    fn changed_files(&self, base: DiffBase, paths: &[RepoFileRef]) -> Result<Vec<ChangedPath>>;

    /// Unified diff for a single path
    fn diff(&self, base: DiffBase, path: &str, context_lines: u32) -> Result<String>;

    /// Commit message plus full diff
    fn show_commit(&self, commit: &str) -> Result<String>;

    /// Paths touched by the most recent `count` commits, newest first
    fn recent_commit_files(&self, count: usize) -> Result<Vec<RepoFileRef>>;

    /// Current working-tree content of a path
    fn read_file(&self, path: &str) -> Result<String>;

    /// Repository root on disk
    fn root(&self) -> &Path;
}

/// Git backend driven through the `git` executable
pub struct GitCli {
    working_dir: PathBuf,
}

impl GitCli {
    /// Open the repository containing `dir`.
    ///
    /// Fails with [`SidekickError::NotARepository`] outside a work tree.
    pub fn discover(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(dir)
            .output()
            .map_err(|e| SidekickError::NotARepository(format!("{}: {}", dir.display(), e)))?;

        if !output.status.success() {
            return Err(SidekickError::NotARepository(dir.display().to_string()));
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self {
            working_dir: PathBuf::from(root),
        })
    }

    /// Whether `dir` is inside a git work tree
    pub fn is_inside_work_tree(dir: impl AsRef<Path>) -> bool {
        Command::new("git")
            .args(["rev-parse", "--is-inside-work-tree"])
            .current_dir(dir.as_ref())
            .output()
            .map(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).trim() == "true")
            .unwrap_or(false)
    }

    fn run_git(&self, args: &[&str]) -> Result<String> {
        self.run_git_raw(args).map(|out| out.trim_end().to_string())
    }

    /// Run git with paths printed verbatim (no octal quoting) and taken
    /// literally as pathspecs; stdout is returned untrimmed.
    fn run_git_raw(&self, args: &[&str]) -> Result<String> {
        debug!("Running git command: git {}", args.join(" "));

        let output = Command::new("git")
            .args(["-c", "core.quotePath=false", "--literal-pathspecs"])
            .args(args)
            .current_dir(&self.working_dir)
            .output()
            .map_err(|e| SidekickError::git(args.join(" "), e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Git command failed: {}", stderr);
            return Err(SidekickError::git(args.join(" "), stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Split `-z` output into paths
    fn paths(output: String) -> Vec<String> {
        output
            .split('\0')
            .map(|p| p.trim_start_matches('\n'))
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    }
}

impl VersionControl for GitCli {
    fn staged_files(&self) -> Result<Vec<RepoFileRef>> {
        self.run_git_raw(&["diff", "--cached", "--name-only", "-z"])
            .map(Self::paths)
    }

    fn unstaged_files(&self) -> Result<Vec<RepoFileRef>> {
        self.run_git_raw(&["diff", "--name-only", "-z"]).map(Self::paths)
    }

    fn changed_files(&self, base: DiffBase, paths: &[RepoFileRef]) -> Result<Vec<ChangedPath>> {
        let mut args = vec!["diff", base.as_arg(), "--name-status", "-z"];
        if !paths.is_empty() {
            args.push("--");
            args.extend(paths.iter().map(String::as_str));
        }

        let output = self.run_git_raw(&args)?;
        Ok(ChangedPath::parse_all_z(&output))
    }

    fn diff(&self, base: DiffBase, path: &str, context_lines: u32) -> Result<String> {
        let unified = format!("-U{}", context_lines);
        self.run_git(&["diff", &unified, base.as_arg(), "--", path])
    }

    fn show_commit(&self, commit: &str) -> Result<String> {
        self.run_git(&["show", "--format=%B", commit])
    }

    fn recent_commit_files(&self, count: usize) -> Result<Vec<RepoFileRef>> {
        let limit = format!("-{}", count);
        let output = self.run_git_raw(&["log", &limit, "--name-only", "--pretty=format:", "-z"])?;

        let mut seen = indexmap::IndexSet::new();
        for line in Self::paths(output) {
            seen.insert(line);
        }
        Ok(seen.into_iter().collect())
    }

    fn read_file(&self, path: &str) -> Result<String> {
        let full = self.working_dir.join(path);
        std::fs::read_to_string(&full)
            .map_err(|e| SidekickError::ContextBuild(format!("cannot read {}: {}", path, e)))
    }

    fn root(&self) -> &Path {
        &self.working_dir
    }
}
