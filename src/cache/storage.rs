//! Persisted Storage Module
//!
//! A small key-value seam standing in for browser local storage. Values are
//! whole JSON documents; every write replaces the previous value.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::tasks::BackgroundTasks;

// == Key Value Storage ==
/// String-keyed, string-valued persistent storage.
pub trait KeyValueStorage: Send + Sync + std::fmt::Debug {
    /// Returns the stored value, `None` when the key was never written.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Deletes `key`. Deleting a missing key is not an error.
    fn remove_item(&self, key: &str) -> Result<()>;
}

// == File Storage ==
/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Creates a storage rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Storage(format!("read {}: {}", key, e))),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        // Write then rename so a crash never leaves a truncated document
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, self.path(key))?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Storage(format!("remove {}: {}", key, e))),
        }
    }
}

// == Memory Storage ==
/// Process-local storage, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.items
            .lock()
            .map_err(|_| CacheError::Storage("memory storage lock poisoned".to_string()))
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

// == Snapshot Writer ==
/// Writes whole-document snapshots of one key off the async runtime.
///
/// Writes run on the blocking pool one at a time. Each submission takes a
/// sequence number when it is queued, and a write older than the last one
/// stored is dropped, so the newest snapshot always wins.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    inner: Arc<WriterInner>,
}

#[derive(Debug)]
struct WriterInner {
    storage: Arc<dyn KeyValueStorage>,
    key: &'static str,
    next_seq: AtomicU64,
    /// Sequence number of the last write that reached storage
    written: tokio::sync::Mutex<u64>,
    tasks: BackgroundTasks,
}

impl SnapshotWriter {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: &'static str) -> Self {
        Self {
            inner: Arc::new(WriterInner {
                storage,
                key,
                next_seq: AtomicU64::new(0),
                written: tokio::sync::Mutex::new(0),
                tasks: BackgroundTasks::new(),
            }),
        }
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStorage> {
        &self.inner.storage
    }

    pub fn key(&self) -> &'static str {
        self.inner.key
    }

    /// Queues a write and returns at once. `render` builds the document on
    /// the blocking pool; `None` deletes the key.
    ///
    /// Call this while holding the lock that guards the snapshotted state, so
    /// sequence order matches mutation order.
    pub fn submit<F>(&self, render: F)
    where
        F: FnOnce() -> Result<Option<String>> + Send + 'static,
    {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = self.inner.clone();

        self.inner.tasks.spawn(async move {
            let mut written = inner.written.lock().await;
            if *written > seq {
                debug!("Skipping superseded write {} of {}", seq, inner.key);
                return;
            }

            let storage = inner.storage.clone();
            let key = inner.key;
            let outcome = tokio::task::spawn_blocking(move || match render()? {
                Some(document) => storage.set_item(key, &document),
                None => storage.remove_item(key),
            })
            .await;

            match outcome {
                Ok(Ok(())) => debug!("Persisted {} (write {})", key, seq),
                Ok(Err(e)) => warn!("Failed to persist {}: {}", key, e),
                Err(e) => warn!("Persist task for {} did not finish: {}", key, e),
            }
            *written = seq;
        });
    }

    /// Waits until every write queued so far has settled.
    pub async fn flush(&self) {
        self.inner.tasks.flush().await;
    }
}
