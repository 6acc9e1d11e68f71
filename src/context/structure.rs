//! Directory structure rendering with per-directory ignore files

use crate::error::{Result, SidekickError};
use glob::Pattern;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Name of the per-directory ignore file
pub const IGNORE_FILE_NAME: &str = ".gitignore";

/// Immutable set of name patterns.
///
/// Extending returns a new set, so patterns picked up in one directory only
/// apply to that directory's subtree.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    patterns: Arc<Vec<Pattern>>,
}

impl IgnoreSet {
    /// Compile patterns, skipping ones that are not valid globs
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::default().extended(patterns)
    }

    /// A new set with `patterns` appended
    pub fn extended<I, S>(&self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut all: Vec<Pattern> = self.patterns.as_ref().clone();
        for raw in patterns {
            if let Some(pattern) = compile(raw.as_ref()) {
                all.push(pattern);
            }
        }
        Self {
            patterns: Arc::new(all),
        }
    }

    /// Whether a bare file or directory name matches any pattern
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn compile(raw: &str) -> Option<Pattern> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
        return None;
    }

    let line = line.trim_end_matches('/').trim_start_matches('/');
    match Pattern::new(line) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            debug!("Skipping invalid ignore pattern {:?}: {}", raw, e);
            None
        }
    }
}

fn read_ignore_file(dir: &Path) -> Result<Vec<String>> {
    let file = dir.join(IGNORE_FILE_NAME);
    if !file.is_file() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(&file)
        .map_err(|e| SidekickError::FatalIo(format!("{}: {}", file.display(), e)))?;
    Ok(text.lines().map(String::from).collect())
}

/// Render the tree under `root` as indented text.
///
/// `depth` limits how many levels below `root` are listed (`None` = no limit).
pub fn render_structure(
    root: &Path,
    ignore: &IgnoreSet,
    use_ignore_file: bool,
    depth: Option<usize>,
) -> Result<String> {
    let mut out = String::new();
    render_into(root, ignore.clone(), use_ignore_file, 0, depth, &mut out)?;
    Ok(out)
}

fn render_into(
    path: &Path,
    ignore: IgnoreSet,
    use_ignore_file: bool,
    indent: usize,
    depth: Option<usize>,
    out: &mut String,
) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    if path.is_dir() {
        let ignore = if use_ignore_file {
            ignore.extended(read_ignore_file(path)?)
        } else {
            ignore
        };

        if ignore.matches(&name) {
            return Ok(());
        }

        out.push_str(&"  ".repeat(indent));
        out.push_str(&format!("- [Directory] {}\n", name));

        if depth.map_or(false, |max| indent >= max) {
            return Ok(());
        }

        let mut children: Vec<_> = fs::read_dir(path)
            .map_err(|e| SidekickError::FatalIo(format!("{}: {}", path.display(), e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        children.sort();

        for child in children {
            render_into(&child, ignore.clone(), use_ignore_file, indent + 1, depth, out)?;
        }
    } else if !ignore.matches(&name) {
        out.push_str(&"  ".repeat(indent));
        out.push_str(&format!("- [File] {}\n", name));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("build")).unwrap();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("README.md"), "hi").unwrap();
        fs::write(root.join("src/lib.rs"), "").unwrap();
        fs::write(root.join("src/debug.log"), "").unwrap();
        fs::write(root.join("src/nested/deep.rs"), "").unwrap();
        fs::write(root.join("build/out.o"), "").unwrap();
        fs::write(root.join("docs/notes.log"), "").unwrap();
        dir
    }

    #[test]
    fn test_render_basic_layout() {
        let dir = fixture();
        let text = render_structure(dir.path(), &IgnoreSet::default(), false, None).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("- [Directory] "));
        assert!(lines.contains(&"  - [File] README.md"));
        assert!(lines.contains(&"  - [Directory] src"));
        assert!(lines.contains(&"    - [File] lib.rs"));
        assert!(lines.contains(&"      - [File] deep.rs"));
    }

    #[test]
    fn test_pattern_prunes_subtree() {
        let dir = fixture();
        let ignore = IgnoreSet::new(["build", "*.log"]);
        let text = render_structure(dir.path(), &ignore, false, None).unwrap();

        assert!(!text.contains("build"));
        assert!(!text.contains("out.o"));
        assert!(!text.contains("debug.log"));
        assert!(!text.contains("notes.log"));
        assert!(text.contains("lib.rs"));
    }

    #[test]
    fn test_ignore_file_scoped_to_subtree() {
        let dir = fixture();
        fs::write(dir.path().join("src/.gitignore"), "# comment\n*.log\n").unwrap();

        let text = render_structure(dir.path(), &IgnoreSet::default(), true, None).unwrap();
        assert!(!text.contains("debug.log"));
        // sibling directory rendered after src must not inherit src's patterns
        assert!(text.contains("notes.log"));
    }

    #[test]
    fn test_root_ignore_file_applies_everywhere() {
        let dir = fixture();
        fs::write(dir.path().join(".gitignore"), "build/\n").unwrap();

        let text = render_structure(dir.path(), &IgnoreSet::default(), true, None).unwrap();
        assert!(!text.contains("out.o"));
        assert!(text.contains(".gitignore"));
    }

    #[test]
    fn test_depth_limit() {
        let dir = fixture();
        let text = render_structure(dir.path(), &IgnoreSet::default(), false, Some(1)).unwrap();
        assert!(text.contains("  - [Directory] src"));
        assert!(!text.contains("lib.rs"));
    }

    #[test]
    fn test_render_is_idempotent() {
        let dir = fixture();
        let ignore = IgnoreSet::new(["*.o"]);
        let first = render_structure(dir.path(), &ignore, true, None).unwrap();
        let second = render_structure(dir.path(), &ignore, true, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_extended_leaves_original_untouched() {
        let base = IgnoreSet::new([".git"]);
        let extended = base.extended(["*.tmp", "", "# nope", "!keep.tmp"]);
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
        assert!(extended.matches("scratch.tmp"));
        assert!(!base.matches("scratch.tmp"));
    }
}
