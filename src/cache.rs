//! # Cache store
//!
//! One human-inspectable JSON file per `(source, normalized query)` key
//! under a fixed namespace directory. Writes go through a temp file and an
//! atomic rename, so concurrent readers observe the old or the new entry,
//! never a partial write. Staleness is lazy: evaluated on read against the
//! `stored_at` timestamp embedded in the entry. Unreadable or malformed
//! entries count as a miss, never an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{Query, SourceResult};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    stored_at: DateTime<Utc>,
    payload: SourceResult,
}

/// File-backed cache for per-source fetch results.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Open (and create if needed) the cache namespace directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating cache dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic key: source id plus a digest of the canonical query.
    /// Equivalent queries share an entry; distinct bboxes never collide.
    pub fn key(source_id: &str, query: &Query) -> String {
        let mut hasher = Sha256::new();
        hasher.update(query.cache_fingerprint().as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        format!("{source_id}-{hex}")
    }

    /// Return the cached payload if it is younger than `max_age`.
    pub fn get(&self, key: &str, max_age: Duration) -> Option<SourceResult> {
        let path = self.path_for(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed; treating as miss");
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(key, error = %e, "corrupt cache entry; treating as miss");
                return None;
            }
        };
        let age = Utc::now().signed_duration_since(entry.stored_at);
        // A clock step backwards makes the entry look future-dated; serve it
        // rather than refetch in a loop.
        let fresh = age.to_std().map(|a| a <= max_age).unwrap_or(true);
        if fresh {
            Some(entry.payload)
        } else {
            tracing::debug!(key, age_secs = age.num_seconds(), "cache entry stale");
            None
        }
    }

    /// Overwrite the entry for `key` via temp-file write + atomic rename.
    pub fn put(&self, key: &str, payload: &SourceResult) -> Result<()> {
        let entry = CacheEntry {
            stored_at: Utc::now(),
            payload: payload.clone(),
        };
        let bytes =
            serde_json::to_vec_pretty(&entry).context("serializing cache entry")?;
        let tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("creating temp file in {}", self.dir.display()))?;
        std::fs::write(tmp.path(), &bytes).context("writing cache temp file")?;
        tmp.persist(self.path_for(key))
            .map_err(|e| e.error)
            .with_context(|| format!("replacing cache entry {key}"))?;
        Ok(())
    }

    /// Timestamp recorded in the entry, if one exists. Used by tests and
    /// diagnostics; freshness checks go through [`CacheStore::get`].
    pub fn stored_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let content = std::fs::read_to_string(self.path_for(key)).ok()?;
        let entry: CacheEntry = serde_json::from_str(&content).ok()?;
        Some(entry.stored_at)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, SourceResult};

    fn store() -> (tempfile::TempDir, CacheStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path().join("cache")).unwrap();
        (dir, store)
    }

    #[test]
    fn put_then_get_within_age_returns_payload() {
        let (_dir, store) = store();
        let result = SourceResult::ok("fdot_traffic", Vec::new());
        store.put("k1", &result).unwrap();
        let got = store.get("k1", Duration::from_secs(3600)).unwrap();
        assert_eq!(got.source_id, "fdot_traffic");
        assert!(got.success);
    }

    #[test]
    fn stale_entry_is_a_miss() {
        let (_dir, store) = store();
        store.put("k1", &SourceResult::ok("a", Vec::new())).unwrap();
        assert!(store.get("k1", Duration::ZERO).is_none());
    }

    #[test]
    fn missing_and_corrupt_entries_are_misses() {
        let (_dir, store) = store();
        assert!(store.get("nope", Duration::from_secs(60)).is_none());

        std::fs::write(store.dir().join("bad.json"), "{ not json").unwrap();
        assert!(store.get("bad", Duration::from_secs(60)).is_none());
    }

    #[test]
    fn put_overwrites_previous_entry() {
        let (_dir, store) = store();
        store.put("k1", &SourceResult::ok("a", Vec::new())).unwrap();
        store
            .put("k1", &SourceResult::failed("a", "boom"))
            .unwrap();
        let got = store.get("k1", Duration::from_secs(60)).unwrap();
        assert!(!got.success);
    }

    #[test]
    fn keys_separate_sources_and_bboxes() {
        let q1 = Query::for_bbox(BoundingBox::new(-80.30, 25.70, -80.25, 25.75));
        let q2 = Query::for_bbox(BoundingBox::new(-80.31, 25.70, -80.25, 25.75));
        assert_ne!(CacheStore::key("a", &q1), CacheStore::key("b", &q1));
        assert_ne!(CacheStore::key("a", &q1), CacheStore::key("a", &q2));
        assert_eq!(CacheStore::key("a", &q1), CacheStore::key("a", &q1.clone()));
    }

    #[test]
    fn entry_file_is_human_inspectable_json() {
        let (_dir, store) = store();
        store.put("k1", &SourceResult::ok("a", Vec::new())).unwrap();
        let text = std::fs::read_to_string(store.dir().join("k1.json")).unwrap();
        assert!(text.contains("\"stored_at\""));
        assert!(text.contains("\"source_id\""));
    }
}
