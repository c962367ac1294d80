//! Ingestion tracker: detects which documents changed since the last run.
//!
//! The ledger is a flat JSON object `{"<absolute path>": <mtime secs>}`
//! stored at the workspace's `ledger_path`. [`diff`] compares it with the
//! current listing of the data folder and rewrites it on every call.
//!
//! Staleness is decided by modification time alone. A file rewritten with
//! identical mtime is not reported as updated.
//!
//! The ledger is persisted before any embedding happens, so a crash during
//! ingestion can leave it ahead of the vector index.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

use crate::workspace::{list_supported_files, UserWorkspace};

/// Path → last-modified-time of every file the index has ingested.
pub type Ledger = BTreeMap<String, f64>;

/// Result of a ledger diff.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestDelta {
    pub new_or_updated: Vec<String>,
    pub removed: Vec<String>,
}

impl IngestDelta {
    pub fn is_empty(&self) -> bool {
        self.new_or_updated.is_empty() && self.removed.is_empty()
    }
}

/// Normalized ledger key for `path`: absolute, symlinks resolved when
/// possible, `/`-separated.
pub fn ledger_key(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf());
    resolved.to_string_lossy().replace('\\', "/")
}

/// Modification time of `path` in fractional seconds since the epoch.
pub fn file_mtime(path: &Path) -> Result<f64> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64())
}

/// Load the ledger; a missing file is an empty ledger.
pub fn load(path: &Path) -> Result<Ledger> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse ledger {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Ledger::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read ledger {}", path.display())),
    }
}

pub fn save(path: &Path, ledger: &Ledger) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(ledger)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write ledger {}", path.display()))
}

/// Classify the workspace's documents as new/updated or removed, and
/// persist the updated ledger.
pub fn diff(ws: &UserWorkspace) -> Result<IngestDelta> {
    let mut ledger = load(&ws.ledger_path)?;

    let mut current: Vec<(String, f64)> = Vec::new();
    for path in list_supported_files(&ws.data_dir)? {
        let mtime = file_mtime(&path)?;
        current.push((ledger_key(&path), mtime));
    }

    let removed: Vec<String> = ledger
        .keys()
        .filter(|k| !current.iter().any(|(c, _)| c == *k))
        .cloned()
        .collect();
    for key in &removed {
        info!(file = %key, "file removed");
        ledger.remove(key);
    }

    let mut new_or_updated = Vec::new();
    for (key, mtime) in current {
        let is_new = match ledger.get(&key) {
            None => true,
            Some(&seen) => seen < mtime,
        };
        if is_new {
            ledger.insert(key.clone(), mtime);
            new_or_updated.push(key);
        }
    }

    // Written on every call, changed or not.
    save(&ws.ledger_path, &ledger)?;

    debug!(
        user = %ws.user_id,
        new = new_or_updated.len(),
        removed = removed.len(),
        "ledger diff"
    );

    Ok(IngestDelta {
        new_or_updated,
        removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceManager;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn setup() -> (TempDir, UserWorkspace) {
        let tmp = TempDir::new().unwrap();
        let ws = WorkspaceManager::new(tmp.path()).ensure("u1").unwrap();
        (tmp, ws)
    }

    fn set_mtime(path: &Path, secs: u64) {
        let f = std::fs::File::options().write(true).open(path).unwrap();
        f.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn first_diff_reports_all_files_as_new() {
        let (_tmp, ws) = setup();
        std::fs::write(ws.data_dir.join("a.pdf"), b"a").unwrap();
        std::fs::write(ws.data_dir.join("b.docx"), b"b").unwrap();

        let delta = diff(&ws).unwrap();
        assert_eq!(delta.new_or_updated.len(), 2);
        assert!(delta.removed.is_empty());
        assert!(ws.ledger_path.exists());
    }

    #[test]
    fn diff_is_idempotent_without_changes() {
        let (_tmp, ws) = setup();
        std::fs::write(ws.data_dir.join("a.pdf"), b"a").unwrap();
        diff(&ws).unwrap();

        for _ in 0..2 {
            let delta = diff(&ws).unwrap();
            assert!(delta.is_empty(), "unexpected delta: {:?}", delta);
        }
    }

    #[test]
    fn diff_detects_removal_once() {
        let (_tmp, ws) = setup();
        let path = ws.data_dir.join("gone.pdf");
        std::fs::write(&path, b"a").unwrap();
        diff(&ws).unwrap();

        std::fs::remove_file(&path).unwrap();
        let delta = diff(&ws).unwrap();
        assert_eq!(delta.removed.len(), 1);
        assert!(delta.removed[0].ends_with("/gone.pdf"));

        let again = diff(&ws).unwrap();
        assert!(again.removed.is_empty());
        assert!(load(&ws.ledger_path).unwrap().is_empty());
    }

    #[test]
    fn newer_mtime_is_reported_as_updated() {
        let (_tmp, ws) = setup();
        let path = ws.data_dir.join("a.pdf");
        std::fs::write(&path, b"v1").unwrap();
        set_mtime(&path, 1_000);
        diff(&ws).unwrap();

        set_mtime(&path, 2_000);
        let delta = diff(&ws).unwrap();
        assert_eq!(delta.new_or_updated, vec![ledger_key(&path)]);
        assert_eq!(load(&ws.ledger_path).unwrap()[&ledger_key(&path)], 2_000.0);
    }

    #[test]
    fn content_change_with_same_mtime_goes_unnoticed() {
        let (_tmp, ws) = setup();
        let path = ws.data_dir.join("a.pdf");
        std::fs::write(&path, b"original").unwrap();
        set_mtime(&path, 5_000);
        diff(&ws).unwrap();

        std::fs::write(&path, b"rewritten content").unwrap();
        set_mtime(&path, 5_000);
        let delta = diff(&ws).unwrap();
        assert!(delta.new_or_updated.is_empty());
    }

    #[test]
    fn unsupported_files_are_ignored() {
        let (_tmp, ws) = setup();
        std::fs::write(ws.data_dir.join("readme.txt"), b"x").unwrap();
        let delta = diff(&ws).unwrap();
        assert!(delta.is_empty());
    }
}
