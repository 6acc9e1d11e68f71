//! File-content context and language detection for the active file set

use super::models::RepoFileRef;
use crate::error::{Result, SidekickError};
use std::collections::BTreeSet;
use std::path::Path;

/// Render the full content of each file, in the given order
pub fn files_context<'a, I>(root: &Path, files: I) -> Result<String>
where
    I: IntoIterator<Item = &'a RepoFileRef>,
{
    let mut out = String::new();

    for file in files {
        let content = std::fs::read_to_string(root.join(file))
            .map_err(|e| SidekickError::ContextBuild(format!("cannot read {}: {}", file, e)))?;

        out.push_str(&format!("--- START OF FILE: {} ---\n", file));
        out.push_str(&content);
        if !content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("--- END OF FILE: {} ---\n", file));
    }

    Ok(out)
}

/// Turn a path given relative to `cwd` into a repository-relative reference.
///
/// The file must exist and live under `root`.
pub fn resolve_repo_path(root: &Path, cwd: &Path, arg: &str) -> Result<RepoFileRef> {
    let full = cwd.join(arg);
    if !full.is_file() {
        return Err(SidekickError::ContextBuild(format!("{} does not exist", arg)));
    }

    let full = full
        .canonicalize()
        .map_err(|e| SidekickError::ContextBuild(format!("{}: {}", arg, e)))?;
    let root = root
        .canonicalize()
        .map_err(|e| SidekickError::ContextBuild(format!("{}: {}", root.display(), e)))?;

    let relative = full.strip_prefix(&root).map_err(|_| {
        SidekickError::ContextBuild(format!("{} is outside the repository", arg))
    })?;

    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn language_for_extension(ext: &str) -> Option<&'static str> {
    let lang = match ext.to_ascii_lowercase().as_str() {
        "rs" => "Rust",
        "py" | "pyi" => "Python",
        "js" | "mjs" | "cjs" | "jsx" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "go" => "Go",
        "java" => "Java",
        "kt" | "kts" => "Kotlin",
        "c" | "h" => "C",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "C++",
        "cs" => "C#",
        "rb" => "Ruby",
        "php" => "PHP",
        "swift" => "Swift",
        "scala" => "Scala",
        "sh" | "bash" | "zsh" => "Shell",
        "sql" => "SQL",
        "html" | "htm" => "HTML",
        "css" | "scss" => "CSS",
        "md" | "markdown" => "Markdown",
        "toml" => "TOML",
        "yaml" | "yml" => "YAML",
        "json" => "JSON",
        _ => return None,
    };
    Some(lang)
}

/// Languages of the given files, deduplicated and sorted
pub fn identify_languages<'a, I>(files: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a RepoFileRef>,
{
    let languages: BTreeSet<&'static str> = files
        .into_iter()
        .filter_map(|f| Path::new(f).extension().and_then(|e| e.to_str()))
        .filter_map(language_for_extension)
        .collect();

    languages.into_iter().map(String::from).collect()
}
