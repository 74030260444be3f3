//! Image Cache Service
//!
//! Async front of the image table. Owns the persisted storage and the
//! fetcher, and turns fetch failures into pass-through URLs.
//!
//! Concurrent `ensure` calls for the same uncached URL share one fetch
//! (single-flight). The fetch runs in its own task, so it completes and lands
//! in the table even when every caller has stopped waiting.
//!
//! Persistence never holds the table lock across I/O: a mutation takes an
//! owned snapshot under the lock and hands it to a [`SnapshotWriter`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{
    current_timestamp_ms, CacheEntry, CacheStats, CacheStore, ImageFetcher, ImageHandle,
    KeyValueStorage, SnapshotWriter, STORAGE_KEY,
};
use crate::config::Config;
use crate::error::{CacheError, Result};

type SharedFetch = Shared<BoxFuture<'static, Result<ImageHandle>>>;

/// Per-URL result of [`ImageCache::preload_many`].
#[derive(Debug, Clone, Serialize)]
pub struct PreloadOutcome {
    pub url: String,
    /// Object URL on success, the original URL on failure
    pub src: String,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PreloadReport {
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<PreloadOutcome>,
}

// == Image Cache ==
/// Shared handle to the process-wide image cache. Cheap to clone.
#[derive(Clone)]
pub struct ImageCache {
    inner: Arc<Inner>,
}

struct Inner {
    store: RwLock<CacheStore>,
    writer: SnapshotWriter,
    fetcher: Arc<dyn ImageFetcher>,
    in_flight: Mutex<HashMap<String, SharedFetch>>,
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("storage", self.inner.writer.storage())
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    // == Init ==
    /// Builds the cache and loads the persisted table, dropping expired
    /// entries. Unreadable storage is logged and the cache starts empty.
    pub fn load(
        store: CacheStore,
        storage: Arc<dyn KeyValueStorage>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        let mut store = store;
        match storage.get_item(STORAGE_KEY) {
            Ok(Some(raw)) => match store.restore(&raw, current_timestamp_ms()) {
                Ok(report) => info!(
                    "Image cache restored: loaded={}, expired={}, invalid={}",
                    report.loaded, report.expired, report.invalid
                ),
                Err(e) => warn!("Ignoring unreadable persisted image cache: {}", e),
            },
            Ok(None) => debug!("No persisted image cache found"),
            Err(e) => warn!("Failed to read persisted image cache: {}", e),
        }

        Self {
            inner: Arc::new(Inner {
                store: RwLock::new(store),
                writer: SnapshotWriter::new(storage, STORAGE_KEY),
                fetcher,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Builds the cache with bounds taken from configuration.
    pub fn from_config(
        config: &Config,
        storage: Arc<dyn KeyValueStorage>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        Self::load(
            CacheStore::new(config.max_entries, config.ttl_ms()),
            storage,
            fetcher,
        )
    }

    // == Get ==
    /// Handle for a fresh cached copy of `url`. Never touches the network.
    pub async fn get(&self, url: &str) -> Option<ImageHandle> {
        self.inner.store.write().await.get(url)
    }

    // == Ensure ==
    /// Returns a local object URL for `url`, fetching it when needed. On any
    /// failure the original `url` comes back unchanged.
    pub async fn ensure(&self, url: &str) -> String {
        match self.try_ensure(url).await {
            Ok(handle) => handle.object_url,
            Err(e) => {
                warn!("Image cache pass-through for {}: {}", url, e);
                url.to_string()
            }
        }
    }

    /// Like [`ImageCache::ensure`], but the caller may stop waiting through
    /// `token`. The fetch itself keeps running and still fills the cache.
    pub async fn ensure_with_cancel(&self, url: &str, token: &CancellationToken) -> String {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Stopped waiting for image {}", url);
                url.to_string()
            }
            src = self.ensure(url) => src,
        }
    }

    /// Fallible form of [`ImageCache::ensure`].
    pub async fn try_ensure(&self, url: &str) -> Result<ImageHandle> {
        if url.trim().is_empty() {
            return Err(CacheError::InvalidRequest("image URL is empty".to_string()));
        }
        if let Some(handle) = self.get(url).await {
            return Ok(handle);
        }
        self.join_flight(url).await
    }

    // == Preload ==
    /// Ensures every URL concurrently. Failures are independent and the call
    /// returns once all attempts have settled.
    pub async fn preload_many<I, S>(&self, urls: I) -> PreloadReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let attempts = urls.into_iter().map(|url| {
            let url: String = url.into();
            async move {
                match self.try_ensure(&url).await {
                    Ok(handle) => PreloadOutcome {
                        src: handle.object_url,
                        url,
                        cached: true,
                        error: None,
                    },
                    Err(e) => {
                        warn!("Preload failed for {}: {}", url, e);
                        PreloadOutcome {
                            src: url.clone(),
                            url,
                            cached: false,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        });

        let outcomes = join_all(attempts).await;
        let succeeded = outcomes.iter().filter(|o| o.cached).count();
        PreloadReport {
            succeeded,
            failed: outcomes.len() - succeeded,
            outcomes,
        }
    }

    // == Clear ==
    /// Revokes every handle, empties the table and deletes the persisted copy.
    pub async fn clear_all(&self) -> usize {
        let mut store = self.inner.store.write().await;
        let removed = store.clear_all();
        self.inner.writer.submit(|| Ok(None));
        info!("Image cache cleared ({} entries)", removed);
        removed
    }

    // == Sweep ==
    /// Drops expired entries now instead of waiting for them to be replaced.
    pub async fn sweep_expired(&self) -> usize {
        let mut store = self.inner.store.write().await;
        let removed = store.sweep_expired_at(current_timestamp_ms());
        if removed > 0 {
            self.persist(&store);
        }
        removed
    }

    // == Resolve ==
    /// Content behind an object URL id.
    pub async fn resolve(&self, id: &str) -> Option<(bytes::Bytes, Option<String>)> {
        self.inner.store.read().await.resolve(id)
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.store.read().await.stats()
    }

    /// Number of fetches currently running.
    pub fn in_flight(&self) -> usize {
        self.flights().len()
    }

    // == Teardown ==
    /// Waits until every queued storage write has landed.
    pub async fn flush(&self) {
        self.inner.writer.flush().await;
    }

    /// Waits for running fetches to settle, then writes the table out.
    pub async fn shutdown(&self) {
        let pending = self.flights();
        if !pending.is_empty() {
            debug!("Waiting for {} image fetches", pending.len());
            join_all(pending).await;
        }
        let len = {
            let store = self.inner.store.read().await;
            self.persist(&store);
            store.len()
        };
        self.flush().await;
        info!("Image cache flushed ({} entries)", len);
    }

    // == Internals ==
    fn flights(&self) -> Vec<SharedFetch> {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Joins the running fetch for `url` or starts one.
    fn join_flight(&self, url: &str) -> SharedFetch {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(flight) = in_flight.get(url) {
            debug!("Joining in-flight fetch for {}", url);
            return flight.clone();
        }

        let this = self.clone();
        let owned = url.to_string();
        let task = tokio::spawn(async move { this.fetch_and_insert(&owned).await });
        let flight = async move {
            task.await
                .unwrap_or_else(|e| Err(CacheError::Internal(format!("fetch task failed: {}", e))))
        }
        .boxed()
        .shared();

        in_flight.insert(url.to_string(), flight.clone());
        flight
    }

    async fn fetch_and_insert(&self, url: &str) -> Result<ImageHandle> {
        let result = self.fetch_into_table(url).await;
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
        result
    }

    async fn fetch_into_table(&self, url: &str) -> Result<ImageHandle> {
        {
            let mut store = self.inner.store.write().await;
            // A flight that finished between our miss and our join already filled it
            if let Some(handle) = store.peek_at(url, current_timestamp_ms()) {
                return Ok(handle);
            }
            store.record_fetch();
        }

        let fetched = match self.inner.fetcher.fetch(url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.inner.store.write().await.record_fetch_failure();
                return Err(e);
            }
        };

        let entry = CacheEntry::new(url, fetched.content, fetched.content_type);
        let mut store = self.inner.store.write().await;
        let handle = store.insert(entry);
        self.persist(&store);
        debug!("Cached image {} ({} entries)", url, store.len());

        handle.ok_or_else(|| CacheError::Internal(format!("{} was evicted on insert", url)))
    }

    /// Queues a write of the whole table. Called with the table lock held so
    /// writes land in mutation order; serialization and I/O happen later on
    /// the blocking pool. Failures are logged and the in-memory table stays
    /// authoritative.
    fn persist(&self, store: &CacheStore) {
        let snapshot = store.snapshot();
        self.inner.writer.submit(move || snapshot.to_json().map(Some));
    }
}
