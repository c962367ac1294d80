//! Per-user filesystem namespaces.
//!
//! Every user owns one directory under the configured base dir:
//!
//! ```text
//! {base_dir}/{user}/
//! ├── data_files_{user}/            raw uploads (PDF/DOCX)
//! ├── vector_db_{user}/             vector index store
//! └── processed_files_{user}.json   ingestion ledger
//! ```
//!
//! Removing the user directory removes the user.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// File extensions the pipeline ingests.
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["pdf", "docx"];

const MAX_USER_ID_LEN: usize = 64;

/// Paths derived from a user id. Nothing here touches the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserWorkspace {
    pub user_id: String,
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub index_dir: PathBuf,
    pub ledger_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

/// User ids become path components, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() || user_id.len() > MAX_USER_ID_LEN {
        bail!("invalid user id: must be 1-{} characters", MAX_USER_ID_LEN);
    }
    if !user_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        bail!("invalid user id: only letters, digits, '_' and '-' are allowed");
    }
    Ok(())
}

/// True when `path` has one of the [`SUPPORTED_EXTENSIONS`].
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

impl WorkspaceManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Compute the workspace paths for `user_id`.
    pub fn paths(&self, user_id: &str) -> Result<UserWorkspace> {
        validate_user_id(user_id)?;
        let root = self.base_dir.join(user_id);
        Ok(UserWorkspace {
            user_id: user_id.to_string(),
            data_dir: root.join(format!("data_files_{}", user_id)),
            index_dir: root.join(format!("vector_db_{}", user_id)),
            ledger_path: root.join(format!("processed_files_{}.json", user_id)),
            root,
        })
    }

    /// Create the workspace directories if missing.
    pub fn ensure(&self, user_id: &str) -> Result<UserWorkspace> {
        let ws = self.paths(user_id)?;
        for dir in [&ws.root, &ws.data_dir, &ws.index_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(ws)
    }

    /// Remove everything stored for `user_id`. Absent workspaces are fine.
    pub fn destroy(&self, user_id: &str) -> Result<()> {
        let ws = self.paths(user_id)?;
        match std::fs::remove_dir_all(&ws.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", ws.root.display())),
        }
    }

    /// Supported documents in the user's data folder, sorted by path.
    pub fn list_documents(&self, user_id: &str) -> Result<Vec<PathBuf>> {
        let ws = self.paths(user_id)?;
        list_supported_files(&ws.data_dir)
    }
}

/// Supported files directly inside `dir` (non-recursive), sorted.
pub fn list_supported_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to list {}", dir.display())),
    };

    let mut files = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if is_supported(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
