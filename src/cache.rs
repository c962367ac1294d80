//! File-backed content cache with a single wall-clock TTL.
//!
//! Each entry lives in `{cache_dir}/{key}.json` as
//! `{"timestamp": <secs since epoch>, "data": <value>}`. Writes replace the
//! whole file. Stale entries are removed lazily on [`ContentCache::get`] and
//! eagerly by [`ContentCache::sweep`].
//!
//! There is no locking: concurrent `put`/`get` on the same key race, and
//! the last writer wins. Cache files are only ever produced by this module,
//! so a torn write shows up as a corrupt entry and is treated as a miss.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    timestamp: f64,
    data: Value,
}

#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
    ttl_secs: f64,
}

/// Current wall-clock time in fractional seconds since the Unix epoch.
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

impl ContentCache {
    /// Open (and create if needed) the cache directory.
    pub fn new(dir: impl Into<PathBuf>, ttl_secs: u64) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache dir: {}", dir.display()))?;
        Ok(Self {
            dir,
            ttl_secs: ttl_secs as f64,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || key == "."
            || key == ".."
            || key.contains(['/', '\\', '\0'])
        {
            bail!("invalid cache key: {:?}", key);
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    /// Store `value` under `key`, overwriting any previous entry.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.put_at(key, value, now_secs())
    }

    /// Like [`put`](Self::put) with an explicit write timestamp.
    pub fn put_at<T: Serialize + ?Sized>(&self, key: &str, value: &T, timestamp: f64) -> Result<()> {
        let path = self.entry_path(key)?;
        let entry = CacheEntry {
            timestamp,
            data: serde_json::to_value(value)?,
        };
        let json = serde_json::to_string_pretty(&entry)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write cache entry: {}", path.display()))?;
        debug!(key, "cache put");
        Ok(())
    }

    /// Fetch a live entry. Missing, expired, and corrupt entries are all misses.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.get_at(key, now_secs())
    }

    /// Like [`get`](Self::get), evaluated as if the current time were `now`.
    pub fn get_at(&self, key: &str, now: f64) -> Result<Option<Value>> {
        let path = self.entry_path(key)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read cache entry: {}", path.display()))
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "removing corrupt cache entry");
                remove_if_present(&path)?;
                return Ok(None);
            }
        };

        if now - entry.timestamp > self.ttl_secs {
            debug!(key, "cache entry expired");
            remove_if_present(&path)?;
            return Ok(None);
        }

        Ok(Some(entry.data))
    }

    /// Typed convenience over [`get`](Self::get). A value that does not
    /// deserialize into `T` is reported as a miss.
    pub fn get_as<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>> {
        Ok(self
            .get(key)?
            .and_then(|value| serde_json::from_value(value).ok()))
    }

    /// Remove every expired or unparsable entry. Returns how many were removed.
    pub fn sweep(&self) -> Result<usize> {
        self.sweep_at(now_secs())
    }

    pub fn sweep_at(&self, now: f64) -> Result<usize> {
        let mut removed = 0;
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        for entry in read_dir {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let stale = match std::fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<CacheEntry>(&c).ok())
            {
                Some(entry) => now - entry.timestamp > self.ttl_secs,
                None => true,
            };

            if stale {
                remove_if_present(&path)?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "cache sweep");
        }
        Ok(removed)
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn cache(ttl: u64) -> (TempDir, ContentCache) {
        let tmp = TempDir::new().unwrap();
        let cache = ContentCache::new(tmp.path().join("cache"), ttl).unwrap();
        (tmp, cache)
    }

    #[test]
    fn put_then_get_round_trips() {
        let (_tmp, cache) = cache(3600);
        let value = json!({"quiz": [{"question": "Why?", "n": 1.5}], "ok": true});
        cache.put("doc_u1_abc_10_mixed", &value).unwrap();
        assert_eq!(cache.get("doc_u1_abc_10_mixed").unwrap(), Some(value));
    }

    #[test]
    fn put_overwrites_previous_entry() {
        let (_tmp, cache) = cache(3600);
        cache.put("k", &json!("first")).unwrap();
        cache.put("k", &json!("second")).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(json!("second")));
    }

    #[test]
    fn missing_key_is_a_miss() {
        let (_tmp, cache) = cache(3600);
        assert_eq!(cache.get("nothing").unwrap(), None);
    }

    #[test]
    fn expired_entry_is_a_miss_and_removed() {
        let (_tmp, cache) = cache(100);
        cache.put_at("k", &json!([1, 2, 3]), 1_000.0).unwrap();
        let path = cache.dir().join("k.json");

        assert!(cache.get_at("k", 1_100.0).unwrap().is_some());
        assert!(path.exists());

        assert_eq!(cache.get_at("k", 1_100.5).unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn entry_file_has_timestamp_and_data_fields() {
        let (_tmp, cache) = cache(3600);
        cache.put_at("k", &json!("transcript text"), 42.0).unwrap();
        let raw = std::fs::read_to_string(cache.dir().join("k.json")).unwrap();
        let v: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["timestamp"], json!(42.0));
        assert_eq!(v["data"], json!("transcript text"));
    }

    #[test]
    fn sweep_removes_stale_and_corrupt_entries_only() {
        let (_tmp, cache) = cache(10);
        cache.put_at("old", &json!(1), 0.0).unwrap();
        cache.put_at("fresh", &json!(2), 95.0).unwrap();
        std::fs::write(cache.dir().join("broken.json"), "{not json").unwrap();
        std::fs::write(cache.dir().join("notes.txt"), "ignored").unwrap();

        let removed = cache.sweep_at(100.0).unwrap();
        assert_eq!(removed, 2);
        assert!(!cache.dir().join("old.json").exists());
        assert!(!cache.dir().join("broken.json").exists());
        assert!(cache.dir().join("fresh.json").exists());
        assert!(cache.dir().join("notes.txt").exists());
    }

    #[test]
    fn corrupt_entry_read_is_a_miss() {
        let (_tmp, cache) = cache(3600);
        std::fs::write(cache.dir().join("bad.json"), "[]").unwrap();
        assert_eq!(cache.get("bad").unwrap(), None);
        assert!(!cache.dir().join("bad.json").exists());
    }

    #[test]
    fn path_like_keys_are_rejected() {
        let (_tmp, cache) = cache(3600);
        assert!(cache.put("../escape", &json!(1)).is_err());
        assert!(cache.put("", &json!(1)).is_err());
        assert!(cache.get("a/b").is_err());
    }

    #[test]
    fn get_as_deserializes_typed_values() {
        let (_tmp, cache) = cache(3600);
        cache.put("yt_u_vid", "some transcript").unwrap();
        let text: Option<String> = cache.get_as("yt_u_vid").unwrap();
        assert_eq!(text.as_deref(), Some("some transcript"));
        let wrong: Option<Vec<u32>> = cache.get_as("yt_u_vid").unwrap();
        assert!(wrong.is_none());
    }
}
