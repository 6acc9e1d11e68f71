//! Git context builder: turns repository change state into model context

use super::git::VersionControl;
use super::models::{ChangeStatus, DiffBase, DiffEntry, RepoFileRef};
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Minimum unified-diff context so the model sees surrounding call sites
pub const MIN_DIFF_CONTEXT_LINES: u32 = 10;

/// Builds diff-based context from a [`VersionControl`] backend
#[derive(Clone)]
pub struct GitContextBuilder {
    vcs: Arc<dyn VersionControl>,
    context_lines: u32,
}

impl GitContextBuilder {
    pub fn new(vcs: Arc<dyn VersionControl>) -> Self {
        Self {
            vcs,
            context_lines: MIN_DIFF_CONTEXT_LINES,
        }
    }

    /// Widen the diff context window (values below the minimum are ignored)
    pub fn with_context_lines(mut self, lines: u32) -> Self {
        self.context_lines = lines.max(MIN_DIFF_CONTEXT_LINES);
        self
    }

    pub fn context_lines(&self) -> u32 {
        self.context_lines
    }

    pub fn vcs(&self) -> &Arc<dyn VersionControl> {
        &self.vcs
    }

    /// Context text for a commit, or for the current changes.
    ///
    /// With a commit, the message and full diff are returned verbatim.
    /// Otherwise the rendered entries are joined in backend order.
    pub fn build_context(&self, commit: Option<&str>, files: Option<&[RepoFileRef]>) -> Result<String> {
        if let Some(commit) = commit {
            debug!("Getting diff for commit {}", commit);
            return self.vcs.show_commit(commit);
        }

        let entries = self.collect_entries(files)?;
        let rendered: Vec<String> = entries.iter().map(ToString::to_string).collect();
        Ok(rendered.join("\n"))
    }

    /// Staged changes win; otherwise the working tree against the last commit
    pub fn diff_base(&self) -> Result<DiffBase> {
        let staged = self.vcs.staged_files()?;
        if staged.is_empty() {
            Ok(DiffBase::Head)
        } else {
            debug!("Getting diff for staged files: {:?}", staged);
            Ok(DiffBase::Staged)
        }
    }

    /// One entry per changed path, in the order the backend reports them
    pub fn collect_entries(&self, files: Option<&[RepoFileRef]>) -> Result<Vec<DiffEntry>> {
        let base = self.diff_base()?;
        let restrict = files.unwrap_or(&[]);

        if base == DiffBase::Staged && !restrict.is_empty() {
            self.warn_partially_staged(restrict)?;
        }

        let changed = self.vcs.changed_files(base, restrict)?;
        let mut entries = Vec::with_capacity(changed.len());

        for change in changed {
            let entry = match change.status {
                ChangeStatus::Added => DiffEntry::Added {
                    content: self.vcs.read_file(&change.path)?,
                    path: change.path,
                },
                ChangeStatus::Renamed => DiffEntry::Renamed {
                    diff: self.vcs.diff(base, &change.path, self.context_lines)?,
                    old_path: change.old_path.unwrap_or_default(),
                    new_path: change.path,
                },
                ChangeStatus::Deleted => DiffEntry::Deleted { path: change.path },
                ChangeStatus::Modified => DiffEntry::Modified {
                    diff: self.vcs.diff(base, &change.path, self.context_lines)?,
                    path: change.path,
                },
            };
            entries.push(entry);
        }

        debug!("Collected {} diff entries against {:?}", entries.len(), base);
        Ok(entries)
    }

    // A file that is staged and then edited again only contributes its staged
    // half; say so instead of silently dropping the rest.
    fn warn_partially_staged(&self, files: &[RepoFileRef]) -> Result<()> {
        let unstaged = self.vcs.unstaged_files()?;
        let partial: Vec<&RepoFileRef> = files.iter().filter(|f| unstaged.contains(f)).collect();

        if !partial.is_empty() {
            warn!(
                "Using staged diff only; unstaged edits are not included for: {:?}",
                partial
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::models::ChangedPath;
    use crate::error::SidekickError;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeVcs {
        staged: Vec<String>,
        unstaged: Vec<String>,
        changes: Vec<ChangedPath>,
        files: HashMap<String, String>,
        reads: Mutex<Vec<String>>,
        diff_calls: Mutex<Vec<(DiffBase, String, u32)>>,
    }

    impl VersionControl for FakeVcs {
        fn staged_files(&self) -> Result<Vec<String>> {
            Ok(self.staged.clone())
        }

        fn unstaged_files(&self) -> Result<Vec<String>> {
            Ok(self.unstaged.clone())
        }

        fn changed_files(&self, _base: DiffBase, paths: &[String]) -> Result<Vec<ChangedPath>> {
            Ok(self
                .changes
                .iter()
                .filter(|c| paths.is_empty() || paths.contains(&c.path))
                .cloned()
                .collect())
        }

        fn diff(&self, base: DiffBase, path: &str, context_lines: u32) -> Result<String> {
            self.diff_calls
                .lock()
                .unwrap()
                .push((base, path.to_string(), context_lines));
            Ok(format!("@@ -1,3 +1,4 @@ {}", path))
        }

        fn show_commit(&self, commit: &str) -> Result<String> {
            Ok(format!("Fix things\n\ndiff for {}", commit))
        }

        fn recent_commit_files(&self, _count: usize) -> Result<Vec<String>> {
            Ok(vec![])
        }

        fn read_file(&self, path: &str) -> Result<String> {
            self.reads.lock().unwrap().push(path.to_string());
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| SidekickError::ContextBuild(format!("missing {}", path)))
        }

        fn root(&self) -> &Path {
            Path::new(".")
        }
    }

    fn change(code: &str, path: &str) -> ChangedPath {
        ChangedPath::parse(&format!("{}\t{}", code, path)).unwrap()
    }

    #[test]
    fn test_commit_context_is_verbatim() {
        let builder = GitContextBuilder::new(Arc::new(FakeVcs::default()));
        let text = builder.build_context(Some("abc123"), None).unwrap();
        assert_eq!(text, "Fix things\n\ndiff for abc123");
    }

    #[test]
    fn test_staged_base_preferred() {
        let vcs = Arc::new(FakeVcs {
            staged: vec!["a.py".into()],
            changes: vec![change("M", "a.py")],
            ..Default::default()
        });
        let builder = GitContextBuilder::new(vcs.clone());
        builder.build_context(None, None).unwrap();

        let calls = vcs.diff_calls.lock().unwrap();
        assert_eq!(calls[0].0, DiffBase::Staged);
        assert_eq!(calls[0].2, MIN_DIFF_CONTEXT_LINES);
    }

    #[test]
    fn test_head_base_without_staged_files() {
        let vcs = Arc::new(FakeVcs {
            changes: vec![change("M", "a.py")],
            ..Default::default()
        });
        let builder = GitContextBuilder::new(vcs.clone());
        assert_eq!(builder.diff_base().unwrap(), DiffBase::Head);
    }

    #[test]
    fn test_added_file_inlined_without_diff() {
        let mut files = HashMap::new();
        files.insert("b.py".to_string(), "print('hello')\n".to_string());
        let vcs = Arc::new(FakeVcs {
            staged: vec!["b.py".into()],
            changes: vec![change("A", "b.py")],
            files,
            ..Default::default()
        });
        let builder = GitContextBuilder::new(vcs.clone());
        let text = builder.build_context(None, None).unwrap();

        assert_eq!(text, "## New file added: b.py\nprint('hello')\n");
        assert!(vcs.diff_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_deleted_file_never_read() {
        let vcs = Arc::new(FakeVcs {
            changes: vec![change("D", "gone.py")],
            ..Default::default()
        });
        let builder = GitContextBuilder::new(vcs.clone());
        let text = builder.build_context(None, None).unwrap();

        assert_eq!(text, "## File deleted: gone.py");
        assert!(vcs.reads.lock().unwrap().is_empty());
        assert!(vcs.diff_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rename_diffs_new_path() {
        let vcs = Arc::new(FakeVcs {
            changes: vec![ChangedPath::parse("R090\told.py\tnew.py").unwrap()],
            ..Default::default()
        });
        let builder = GitContextBuilder::new(vcs.clone());
        let text = builder.build_context(None, None).unwrap();

        assert!(text.starts_with("## File renamed: old.py -> new.py"));
        assert_eq!(vcs.diff_calls.lock().unwrap()[0].1, "new.py");
    }

    #[test]
    fn test_missing_added_file_propagates() {
        let vcs = Arc::new(FakeVcs {
            changes: vec![change("A", "ghost.py")],
            ..Default::default()
        });
        let builder = GitContextBuilder::new(vcs);
        let result = builder.build_context(None, None);
        assert!(matches!(result, Err(SidekickError::ContextBuild(_))));
    }

    #[test]
    fn test_restricted_to_files_in_backend_order() {
        let vcs = Arc::new(FakeVcs {
            changes: vec![change("M", "z.py"), change("M", "a.py"), change("M", "m.py")],
            ..Default::default()
        });
        let builder = GitContextBuilder::new(vcs);
        let entries = builder
            .collect_entries(Some(&["m.py".to_string(), "z.py".to_string()]))
            .unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path()).collect();
        assert_eq!(paths, vec!["z.py", "m.py"]);
    }

    #[test]
    fn test_context_lines_floor() {
        let builder = GitContextBuilder::new(Arc::new(FakeVcs::default())).with_context_lines(3);
        assert_eq!(builder.context_lines(), MIN_DIFF_CONTEXT_LINES);
        let builder = GitContextBuilder::new(Arc::new(FakeVcs::default())).with_context_lines(25);
        assert_eq!(builder.context_lines(), 25);
    }
}
