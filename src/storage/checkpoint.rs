//! Checkpoint store for resuming interrupted harvests
//!
//! The store keeps the set of completed URLs in memory and persists it,
//! together with a statistics snapshot, to a JSON file. Persistence writes a
//! sibling temporary file, syncs it and renames it over the target, so a
//! reader only ever sees the previous checkpoint or the new one.
//!
//! `load` fails open: a missing or unreadable checkpoint is logged and
//! treated as empty state.

use crate::crawler::FetchResult;
use crate::output::Stats;
use crate::storage::traits::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncWriteExt;

/// Current on-disk checkpoint format
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Durable snapshot of completed work and statistics
///
/// Every field has a default so checkpoints written by older versions (or
/// missing fields in general) load cleanly; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checkpoint {
    pub schema_version: u32,

    /// URLs that reached a terminal outcome
    pub completed: BTreeSet<String>,

    pub stats: Stats,

    pub saved_at: Option<DateTime<Utc>>,

    /// Hash of the configuration file in effect when the checkpoint was saved
    pub config_hash: Option<String>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            completed: BTreeSet::new(),
            stats: Stats::default(),
            saved_at: None,
            config_hash: None,
        }
    }
}

/// Owner of the completed-URL set and its durable copy
pub struct CheckpointStore {
    path: PathBuf,
    tmp_path: PathBuf,
    /// Directory holding the checkpoint, synced after each rename
    dir_path: PathBuf,
    config_hash: Option<String>,
    completed: Mutex<HashSet<String>>,
    /// Serializes flushes so temp files never interleave
    flush_lock: tokio::sync::Mutex<()>,
}

impl CheckpointStore {
    /// Opens a store writing to `path`
    ///
    /// Creates the parent directory if needed and checks that it is writable.
    /// An unwritable location is the one checkpoint error that is fatal.
    pub fn open(path: &Path, config_hash: Option<String>) -> StorageResult<Self> {
        let file_name = path
            .file_name()
            .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;

        let mut tmp_name = OsString::from(file_name);
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        let dir_path = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::CheckpointDir(format!("{}: {}", parent.display(), e))
                })?;
                parent.to_path_buf()
            }
            None => PathBuf::from("."),
        };

        // Writability check on the exact temp path flush will use
        std::fs::write(&tmp_path, b"")
            .and_then(|_| std::fs::remove_file(&tmp_path))
            .map_err(|e| StorageError::CheckpointDir(format!("{}: {}", tmp_path.display(), e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            dir_path,
            config_hash,
            completed: Mutex::new(HashSet::new()),
            flush_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn completed(&self) -> MutexGuard<'_, HashSet<String>> {
        self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads the checkpoint from disk and adopts its completed set
    ///
    /// Never fails: missing, unreadable or corrupt files yield an empty
    /// checkpoint after logging why.
    pub fn load(&self) -> Checkpoint {
        let checkpoint = read_checkpoint(&self.path);

        if checkpoint.schema_version > CHECKPOINT_SCHEMA_VERSION {
            tracing::warn!(
                "Checkpoint {} has schema version {} (newer than {}), loading known fields only",
                self.path.display(),
                checkpoint.schema_version,
                CHECKPOINT_SCHEMA_VERSION
            );
        }

        if let (Some(saved), Some(current)) = (&checkpoint.config_hash, &self.config_hash) {
            if saved != current {
                tracing::warn!("Configuration changed since the checkpoint was saved");
            }
        }

        let mut completed = self.completed();
        completed.clear();
        completed.extend(checkpoint.completed.iter().cloned());

        checkpoint
    }

    /// Marks `url` complete
    ///
    /// Returns false if the URL was already complete. Only the in-memory set
    /// changes; nothing is written until the next `flush`.
    pub fn record(&self, url: &str, outcome: &FetchResult) -> bool {
        let inserted = self.completed().insert(url.to_string());
        if inserted {
            tracing::trace!(
                "Checkpoint recorded {} ({})",
                url,
                if outcome.is_success() { "success" } else { "failure" }
            );
        } else {
            tracing::warn!("{} was already complete, ignoring duplicate result", url);
        }
        inserted
    }

    pub fn is_completed(&self, url: &str) -> bool {
        self.completed().contains(url)
    }

    pub fn completed_count(&self) -> usize {
        self.completed().len()
    }

    /// Atomically persists the completed set and `stats`
    ///
    /// The set is copied under the lock and the lock released before any I/O,
    /// so concurrent `record` calls are never blocked by disk writes.
    /// Returns the timestamp stored in the checkpoint.
    pub async fn flush(&self, stats: &Stats) -> StorageResult<DateTime<Utc>> {
        let _flushing = self.flush_lock.lock().await;

        let completed: BTreeSet<String> = self.completed().iter().cloned().collect();
        let saved_at = Utc::now();

        let mut stats = stats.clone();
        stats.last_checkpoint_time = Some(saved_at);

        let checkpoint = Checkpoint {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            completed,
            stats,
            saved_at: Some(saved_at),
            config_hash: self.config_hash.clone(),
        };
        let encoded = serde_json::to_vec(&checkpoint)?;

        let mut file = tokio::fs::File::create(&self.tmp_path).await?;
        file.write_all(&encoded).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&self.tmp_path, &self.path).await?;
        sync_dir(&self.dir_path).await?;

        tracing::debug!(
            "Checkpoint saved: {} completed URLs to {}",
            checkpoint.completed.len(),
            self.path.display()
        );
        Ok(saved_at)
    }
}

/// Makes a completed rename in `dir` durable
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

/// Directories cannot be opened for syncing here; rename durability is left to the OS
#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Reads a checkpoint file, falling back to an empty checkpoint on any error
pub fn read_checkpoint(path: &Path) -> Checkpoint {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No checkpoint at {}, starting from scratch", path.display());
            return Checkpoint::default();
        }
        Err(e) => {
            tracing::warn!(
                "Failed to read checkpoint {}: {}; starting from scratch",
                path.display(),
                e
            );
            return Checkpoint::default();
        }
    };

    match serde_json::from_slice::<Checkpoint>(&bytes) {
        Ok(checkpoint) => {
            tracing::info!(
                "Checkpoint loaded from {} ({} completed URLs, saved {})",
                path.display(),
                checkpoint.completed.len(),
                checkpoint
                    .saved_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "at an unknown time".to_string())
            );
            checkpoint
        }
        Err(e) => {
            tracing::warn!(
                "Checkpoint {} is corrupt ({}); starting from scratch",
                path.display(),
                e
            );
            Checkpoint::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::FailureKind;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn ok() -> FetchResult {
        FetchResult::Success {
            title: String::new(),
            content: "body".to_string(),
            metadata: BTreeMap::new(),
            size_bytes: 4,
        }
    }

    fn failed() -> FetchResult {
        FetchResult::Failure {
            kind: FailureKind::PermanentRequest,
            message: "HTTP 404".to_string(),
        }
    }

    #[tokio::test]
    async fn test_flush_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");

        let store = CheckpointStore::open(&path, Some("hash-1".to_string())).unwrap();
        store.record("https://example.com/a", &ok());
        store.record("https://example.com/b", &failed());
        let stats = Stats {
            attempted: 2,
            succeeded: 1,
            failed: 1,
            total_bytes: 4,
            ..Stats::default()
        };
        let saved_at = store.flush(&stats).await.unwrap();

        let reopened = CheckpointStore::open(&path, Some("hash-1".to_string())).unwrap();
        let checkpoint = reopened.load();
        assert_eq!(checkpoint.schema_version, CHECKPOINT_SCHEMA_VERSION);
        assert_eq!(checkpoint.completed.len(), 2);
        assert_eq!(checkpoint.stats.counters(), stats.counters());
        assert_eq!(checkpoint.stats.last_checkpoint_time, Some(saved_at));
        assert_eq!(checkpoint.config_hash.as_deref(), Some("hash-1"));
        assert!(reopened.is_completed("https://example.com/a"));
        assert!(!path.with_file_name("checkpoint.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_flush_syncs_nested_checkpoint_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("runs").join("today");
        let path = nested.join("checkpoint.json");

        let store = CheckpointStore::open(&path, None).unwrap();
        assert_eq!(store.dir_path, nested);
        store.record("https://example.com/a", &ok());
        store.flush(&Stats::default()).await.unwrap();
        store.flush(&Stats::default()).await.unwrap();

        assert!(path.exists());
        assert!(!nested.join("checkpoint.json.tmp").exists());
        assert_eq!(read_checkpoint(&path).completed.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sync_dir_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        sync_dir(dir.path()).await.unwrap();
        assert!(sync_dir(&dir.path().join("gone")).await.is_err());
    }

    #[test]
    fn test_missing_checkpoint_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(&dir.path().join("none.json"), None).unwrap();

        let checkpoint = store.load();
        assert!(checkpoint.completed.is_empty());
        assert_eq!(checkpoint.stats.attempted, 0);
    }

    #[test]
    fn test_corrupt_checkpoint_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, b"{\"completed\": [\"https://exa").unwrap();

        let store = CheckpointStore::open(&path, None).unwrap();
        assert!(store.load().completed.is_empty());
        assert_eq!(store.completed_count(), 0);
    }

    #[test]
    fn test_old_checkpoint_missing_fields_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(
            &path,
            br#"{"completed": ["https://example.com/a"], "future_field": 7}"#,
        )
        .unwrap();

        let store = CheckpointStore::open(&path, None).unwrap();
        let checkpoint = store.load();
        assert_eq!(checkpoint.completed.len(), 1);
        assert_eq!(checkpoint.stats.succeeded, 0);
        assert!(checkpoint.saved_at.is_none());
    }

    #[test]
    fn test_record_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(&dir.path().join("c.json"), None).unwrap();

        assert!(store.record("https://example.com/a", &ok()));
        assert!(!store.record("https://example.com/a", &failed()));
        assert_eq!(store.completed_count(), 1);
    }

    #[test]
    fn test_concurrent_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CheckpointStore::open(&dir.path().join("c.json"), None).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        // Every thread records the same 100 URLs plus its own 100
                        store.record(&format!("https://example.com/shared/{}", i), &ok());
                        store.record(&format!("https://example.com/{}/{}", t, i), &ok());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.completed_count(), 100 + 8 * 100);
    }

    #[tokio::test]
    async fn test_completed_count_never_decreases_across_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let store = CheckpointStore::open(&path, None).unwrap();

        let mut last = 0;
        for i in 0..5 {
            store.record(&format!("https://example.com/{}", i), &ok());
            store.flush(&Stats::default()).await.unwrap();

            let on_disk = read_checkpoint(&path).completed.len();
            assert!(on_disk >= last);
            last = on_disk;
        }
        assert_eq!(last, 5);
    }

    #[tokio::test]
    async fn test_stale_temp_file_does_not_affect_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let store = CheckpointStore::open(&path, None).unwrap();
        store.record("https://example.com/a", &ok());
        store.flush(&Stats::default()).await.unwrap();

        // Simulates a crash midway through the next flush
        std::fs::write(dir.path().join("checkpoint.json.tmp"), b"{\"compl").unwrap();

        let reopened = CheckpointStore::open(&path, None).unwrap();
        assert_eq!(reopened.load().completed.len(), 1);
    }

    #[test]
    fn test_unwritable_location_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let result = CheckpointStore::open(&blocker.join("checkpoint.json"), None);
        assert!(matches!(result, Err(StorageError::CheckpointDir(_))));
    }
}
