//! Data models for repository context

use serde::{Deserialize, Serialize};
use std::fmt;

/// Path of a repository file, relative to the repository root
pub type RepoFileRef = String;

/// Status code reported by the versioning backend for a changed path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeStatus {
    Added,
    Renamed,
    Deleted,
    Modified,
}

impl ChangeStatus {
    /// Classify by the first character of a name-status code.
    /// Anything other than A/R/D is treated as a modification.
    pub fn from_code(code: &str) -> Self {
        match code.chars().next() {
            Some('A') => ChangeStatus::Added,
            Some('R') => ChangeStatus::Renamed,
            Some('D') => ChangeStatus::Deleted,
            _ => ChangeStatus::Modified,
        }
    }
}

/// One line of `--name-status` output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedPath {
    pub status: ChangeStatus,
    /// Current path (new path for renames)
    pub path: RepoFileRef,
    /// Previous path, only set for renames
    pub old_path: Option<RepoFileRef>,
}

impl ChangedPath {
    /// Parse a tab-separated name-status line ("M\tsrc/lib.rs", "R100\told\tnew")
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split('\t');
        let code = parts.next()?.trim();
        if code.is_empty() {
            return None;
        }
        Self::from_fields(code, &mut parts)
    }

    /// Parse NUL-separated `--name-status -z` output.
    ///
    /// Paths arrive unquoted, so names with non-ASCII bytes or tabs survive.
    pub fn parse_all_z(output: &str) -> Vec<Self> {
        let mut fields = output.split('\0');
        let mut changes = Vec::new();

        while let Some(code) = fields.next() {
            let code = code.trim();
            if code.is_empty() {
                continue;
            }
            match Self::from_fields(code, &mut fields) {
                Some(change) => changes.push(change),
                None => break,
            }
        }
        changes
    }

    fn from_fields<'a>(code: &str, fields: &mut impl Iterator<Item = &'a str>) -> Option<Self> {
        let status = ChangeStatus::from_code(code);
        let first = fields.next().filter(|p| !p.is_empty())?.to_string();

        // renames and copies carry a source and a destination path
        if code.starts_with('R') || code.starts_with('C') {
            let second = fields.next().filter(|p| !p.is_empty())?.to_string();
            let old_path = (status == ChangeStatus::Renamed).then_some(first);
            return Some(Self {
                status,
                path: second,
                old_path,
            });
        }

        Some(Self {
            status,
            path: first,
            old_path: None,
        })
    }
}

/// Which side the working changes are diffed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffBase {
    /// The index (`--cached`)
    Staged,
    /// Working tree against the last commit (`HEAD`)
    Head,
}

impl DiffBase {
    pub fn as_arg(&self) -> &'static str {
        match self {
            DiffBase::Staged => "--cached",
            DiffBase::Head => "HEAD",
        }
    }
}

/// A rendered change for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffEntry {
    Added {
        path: RepoFileRef,
        content: String,
    },
    Renamed {
        old_path: RepoFileRef,
        new_path: RepoFileRef,
        diff: String,
    },
    Deleted {
        path: RepoFileRef,
    },
    Modified {
        path: RepoFileRef,
        diff: String,
    },
}

impl DiffEntry {
    /// Path the entry is keyed by (new path for renames)
    pub fn path(&self) -> &str {
        match self {
            DiffEntry::Added { path, .. }
            | DiffEntry::Deleted { path }
            | DiffEntry::Modified { path, .. } => path,
            DiffEntry::Renamed { new_path, .. } => new_path,
        }
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffEntry::Added { path, content } => {
                write!(f, "## New file added: {}\n{}", path, content)
            }
            DiffEntry::Renamed {
                old_path,
                new_path,
                diff,
            } => write!(f, "## File renamed: {} -> {}\n{}", old_path, new_path, diff),
            DiffEntry::Deleted { path } => write!(f, "## File deleted: {}", path),
            DiffEntry::Modified { path, diff } => {
                write!(f, "## File changed: {}\n{}", path, diff)
            }
        }
    }
}

/// Assembled background text handed to the model
///
/// The token size is not stored; it is recomputed on demand because the
/// file set and the diff can change between turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub structure: Option<String>,
    pub files: Option<String>,
    pub diffs: Vec<DiffEntry>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.structure.as_deref().map_or(true, str::is_empty)
            && self.files.as_deref().map_or(true, str::is_empty)
            && self.diffs.is_empty()
    }

    /// Render the bundle as a single text block
    pub fn render(&self) -> String {
        let mut sections = Vec::new();

        if let Some(structure) = self.structure.as_deref().filter(|s| !s.is_empty()) {
            sections.push(format!("# Directory structure\n{}", structure));
        }

        if let Some(files) = self.files.as_deref().filter(|s| !s.is_empty()) {
            sections.push(files.to_string());
        }

        if !self.diffs.is_empty() {
            let diffs: Vec<String> = self.diffs.iter().map(ToString::to_string).collect();
            sections.push(format!("# Current changes\n{}", diffs.join("\n")));
        }

        sections.join("\n\n")
    }
}
