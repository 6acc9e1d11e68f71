//! Session persistence: the active file set, stored as one JSON record

use crate::context::RepoFileRef;
use crate::error::{Result, SidekickError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persisted session record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Active files, in order
    #[serde(default)]
    pub files: Vec<RepoFileRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Reads and writes the session file.
///
/// Writes are whole-record and skipped when the file set is unchanged
/// from what was last persisted.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    last_persisted: Option<Vec<RepoFileRef>>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_persisted: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record; a missing file is an empty session
    pub fn read(&mut self) -> Result<SessionState> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No session file at {}", self.path.display());
                return Ok(SessionState::default());
            }
            Err(e) => {
                return Err(SidekickError::FatalIo(format!(
                    "reading {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let state: SessionState = serde_json::from_str(&raw).map_err(|e| {
            SidekickError::FatalIo(format!("parsing {}: {}", self.path.display(), e))
        })?;

        self.last_persisted = Some(state.files.clone());
        Ok(state)
    }

    /// Persist `files` unless the set equals the last persisted one.
    /// Returns whether a write happened.
    pub fn write_if_changed(&mut self, files: &[RepoFileRef]) -> Result<bool> {
        if let Some(previous) = &self.last_persisted {
            if same_set(previous, files) {
                debug!("Session file set unchanged, skipping write");
                return Ok(false);
            }
        }

        let state = SessionState {
            files: files.to_vec(),
            updated_at: Some(Utc::now()),
        };
        self.write(&state)?;
        self.last_persisted = Some(state.files);
        info!("Saved {} files to session", files.len());
        Ok(true)
    }

    fn write(&self, state: &SessionState) -> Result<()> {
        let fatal = |e: std::io::Error| {
            SidekickError::FatalIo(format!("writing {}: {}", self.path.display(), e))
        };

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let body = serde_json::to_string_pretty(state)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(fatal)?;
        tmp.write_all(body.as_bytes()).map_err(fatal)?;
        tmp.persist(&self.path).map_err(|e| {
            warn!("Could not replace session file: {}", e);
            fatal(e.error)
        })?;

        Ok(())
    }
}

fn same_set(a: &[RepoFileRef], b: &[RepoFileRef]) -> bool {
    let a: HashSet<&RepoFileRef> = a.iter().collect();
    let b: HashSet<&RepoFileRef> = b.iter().collect();
    a == b
}
