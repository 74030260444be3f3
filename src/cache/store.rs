//! Cache Store Module
//!
//! The image table: HashMap storage with insertion-order tracking, TTL checks,
//! oldest-first eviction and the object-URL registry. Synchronous and free of
//! I/O; the async service owns persistence and fetching.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::cache::entry::PersistedEntry;
use crate::cache::{current_timestamp_ms, CacheEntry, CacheStats, InsertionOrder, BLOB_ROUTE_PREFIX};
use crate::error::Result;

// == Image Handle ==
/// A locally resolvable reference to cached image content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    /// Object URL id
    pub id: String,
    /// Path this process serves the content under
    pub object_url: String,
    /// Remote URL the content was fetched from
    pub source_url: String,
}

impl ImageHandle {
    fn new(id: String, source_url: &str) -> Self {
        Self {
            object_url: format!("{}{}", BLOB_ROUTE_PREFIX, id),
            id,
            source_url: source_url.to_string(),
        }
    }
}

/// Outcome of restoring the table from its persisted form.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    pub loaded: usize,
    pub expired: usize,
    pub invalid: usize,
}

// == Cache Store ==
/// Bounded, TTL-aware image table.
#[derive(Debug)]
pub struct CacheStore {
    /// URL -> entry
    entries: HashMap<String, CacheEntry>,
    /// First-insertion order, the eviction tie-break
    order: InsertionOrder,
    /// Object URL id -> source URL
    handles: HashMap<String, String>,
    stats: CacheStats,
    max_entries: usize,
    ttl_ms: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store.
    ///
    /// # Arguments
    /// * `max_entries` - Size bound enforced after every insertion
    /// * `ttl_ms` - Age in milliseconds at which an entry stops being served
    pub fn new(max_entries: usize, ttl_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            order: InsertionOrder::new(),
            handles: HashMap::new(),
            stats: CacheStats::new(),
            max_entries,
            ttl_ms,
        }
    }

    // == Restore ==
    /// Loads entries from a persisted document, dropping expired ones.
    ///
    /// Entries are taken in document order. Malformed entries are skipped and
    /// counted as invalid; a document that is not a JSON object is an error.
    pub fn restore(&mut self, raw: &str, now: u64) -> Result<RestoreReport> {
        let persisted: PersistedEntries = serde_json::from_str(raw)?;
        let mut report = RestoreReport::default();

        for (url, value) in persisted.0 {
            let entry = serde_json::from_value::<PersistedEntry>(value)
                .map_err(|e| e.to_string())
                .and_then(|p| CacheEntry::try_from(p).map_err(|e| e.to_string()));

            let mut entry = match entry {
                Ok(entry) => entry,
                Err(reason) => {
                    warn!("Skipping unreadable cache entry for {}: {}", url, reason);
                    report.invalid += 1;
                    continue;
                }
            };

            if entry.is_expired_at(now, self.ttl_ms) {
                report.expired += 1;
                continue;
            }

            entry.url = url.clone();
            self.replace_entry(url, entry);
            report.loaded += 1;
        }

        // A smaller configured bound applies to restored tables too
        self.evict_if_over_capacity();
        Ok(report)
    }

    // == Get ==
    /// Returns a handle for `url` if a fresh entry exists.
    pub fn get(&mut self, url: &str) -> Option<ImageHandle> {
        self.get_at(url, current_timestamp_ms())
    }

    /// Same as [`CacheStore::get`] with an explicit clock reading.
    ///
    /// Expired entries stay in the table until they are overwritten, swept or
    /// evicted; they are only reported as absent.
    pub fn get_at(&mut self, url: &str, now: u64) -> Option<ImageHandle> {
        let fresh = matches!(self.entries.get(url), Some(e) if !e.is_expired_at(now, self.ttl_ms));
        if !fresh {
            self.stats.record_miss();
            return None;
        }

        self.stats.record_hit();
        self.handle_for(url)
    }

    /// Fresh-entry lookup that leaves the hit/miss counters alone.
    pub(crate) fn peek_at(&mut self, url: &str, now: u64) -> Option<ImageHandle> {
        let fresh = matches!(self.entries.get(url), Some(e) if !e.is_expired_at(now, self.ttl_ms));
        if fresh {
            self.handle_for(url)
        } else {
            None
        }
    }

    // == Insert ==
    /// Inserts or replaces the entry for `entry.url`, then enforces the size
    /// bound. Returns the handle for the new content, or `None` when the
    /// entry was itself the eviction victim (zero bound, backdated entry).
    pub fn insert(&mut self, entry: CacheEntry) -> Option<ImageHandle> {
        let url = entry.url.clone();
        self.replace_entry(url.clone(), entry);
        self.evict_if_over_capacity();
        self.handle_for(&url)
    }

    // == Evict ==
    /// Drops the oldest entries while the table exceeds its bound.
    ///
    /// Oldest means smallest timestamp; equal timestamps fall back to
    /// insertion order. Returns the number of entries removed.
    pub fn evict_if_over_capacity(&mut self) -> usize {
        if self.entries.len() <= self.max_entries {
            return 0;
        }

        let mut ranked: Vec<(u64, &String)> = self
            .order
            .iter()
            .filter_map(|url| self.entries.get(url).map(|e| (e.timestamp, url)))
            .collect();
        // Stable sort keeps insertion order among equal timestamps
        ranked.sort_by_key(|(timestamp, _)| *timestamp);

        let excess = self.entries.len() - self.max_entries;
        let victims: Vec<String> = ranked
            .into_iter()
            .take(excess)
            .map(|(_, url)| url.clone())
            .collect();

        for url in &victims {
            self.remove_entry(url);
        }
        self.stats.record_evictions(victims.len());
        victims.len()
    }

    // == Clear ==
    /// Revokes every handle and empties the table. Returns the number of
    /// entries removed.
    pub fn clear_all(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.order.clear();
        self.handles.clear();
        removed
    }

    // == Sweep ==
    /// Removes every entry that is expired at `now`.
    pub fn sweep_expired_at(&mut self, now: u64) -> usize {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.is_expired_at(now, self.ttl_ms))
            .map(|e| e.url.clone())
            .collect();

        for url in &expired {
            self.remove_entry(url);
        }
        expired.len()
    }

    // == Resolve ==
    /// Content and media type behind an object URL id.
    pub fn resolve(&self, id: &str) -> Option<(Bytes, Option<String>)> {
        let url = self.handles.get(id)?;
        let entry = self.entries.get(url)?;
        Some((entry.content.clone(), entry.content_type.clone()))
    }

    // == Serialize ==
    /// The whole table as the persisted JSON document, in table order.
    pub fn to_json(&self) -> Result<String> {
        self.snapshot().to_json()
    }

    /// Owned copy of the table in insertion order. Content is shared, not
    /// copied, so this is cheap to take under a lock.
    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot(
            self.order
                .iter()
                .filter_map(|url| self.entries.get(url).cloned())
                .collect(),
        )
    }

    pub(crate) fn record_fetch(&mut self) {
        self.stats.record_fetch();
    }

    pub(crate) fn record_fetch_failure(&mut self) {
        self.stats.record_fetch_failure();
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    /// Entry timestamp for `url`, expired or not.
    pub fn timestamp(&self, url: &str) -> Option<u64> {
        self.entries.get(url).map(|e| e.timestamp)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    /// URLs in insertion order.
    pub fn urls(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    // == Internals ==
    fn handle_for(&mut self, url: &str) -> Option<ImageHandle> {
        let entry = self.entries.get_mut(url)?;
        let id = match &entry.handle {
            Some(id) => id.clone(),
            None => {
                let id = Uuid::new_v4().to_string();
                entry.handle = Some(id.clone());
                self.handles.insert(id.clone(), url.to_string());
                id
            }
        };
        Some(ImageHandle::new(id, url))
    }

    fn replace_entry(&mut self, url: String, entry: CacheEntry) {
        self.order.insert(&url);
        if let Some(old) = self.entries.insert(url, entry) {
            self.revoke(&old);
        }
    }

    fn remove_entry(&mut self, url: &str) {
        if let Some(old) = self.entries.remove(url) {
            self.revoke(&old);
        }
        self.order.remove(url);
    }

    fn revoke(&mut self, entry: &CacheEntry) {
        if let Some(id) = &entry.handle {
            self.handles.remove(id);
        }
    }
}

// == Table Snapshot ==
/// Point-in-time copy of the table, serialized off the lock.
#[derive(Debug, Clone)]
pub struct TableSnapshot(Vec<CacheEntry>);

impl TableSnapshot {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The persisted JSON document: an object keyed by URL, in table order.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for TableSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in &self.0 {
            map.serialize_entry(&entry.url, &PersistedEntry::from(entry))?;
        }
        map.end()
    }
}

/// Persisted entries in document order, values left unparsed so one bad
/// entry does not discard the rest.
struct PersistedEntries(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for PersistedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = PersistedEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of image URL to cache entry")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((url, value)) = access.next_entry::<String, Value>()? {
                    entries.push((url, value));
                }
                Ok(PersistedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    const TTL: u64 = 24 * 60 * 60 * 1000;

    fn entry(url: &str, timestamp: u64) -> CacheEntry {
        CacheEntry::with_timestamp(url, Bytes::from(url.to_string()), Some("image/png".into()), timestamp)
    }

    #[test]
    fn test_store_new() {
        let store = CacheStore::new(50, TTL);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = CacheStore::new(50, TTL);

        let inserted = store.insert(entry("a", 1_000)).unwrap();
        let fetched = store.get_at("a", 2_000).unwrap();

        assert_eq!(inserted, fetched, "one handle per live entry");
        assert!(fetched.object_url.starts_with("/blob/"));
        assert_eq!(fetched.source_url, "a");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let mut store = CacheStore::new(50, TTL);

        assert!(store.get_at("missing", 0).is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_get_expired_is_absent() {
        let mut store = CacheStore::new(50, TTL);
        store.insert(entry("a", 1_000));

        assert!(store.get_at("a", 1_000 + TTL - 1).is_some());
        assert!(store.get_at("a", 1_000 + TTL).is_none());
        // Still in the table until overwritten or swept
        assert!(store.contains("a"));

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_overwrite_replaces_content_and_revokes_handle() {
        let mut store = CacheStore::new(50, TTL);

        let old = store.insert(entry("a", 1_000)).unwrap();
        let new = store
            .insert(CacheEntry::with_timestamp("a", Bytes::from_static(b"new"), None, 2_000))
            .unwrap();

        assert_ne!(old.id, new.id);
        assert!(store.resolve(&old.id).is_none());
        assert_eq!(store.resolve(&new.id).unwrap().0, Bytes::from_static(b"new"));
        assert_eq!(store.timestamp("a"), Some(2_000));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_eviction_keeps_newest() {
        let mut store = CacheStore::new(3, TTL);

        store.insert(entry("a", 10));
        store.insert(entry("b", 30));
        store.insert(entry("c", 20));
        store.insert(entry("d", 40));

        assert_eq!(store.len(), 3);
        assert!(!store.contains("a"));
        assert_eq!(store.urls(), vec!["b", "c", "d"]);
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_eviction_tie_breaks_on_insertion_order() {
        let mut store = CacheStore::new(2, TTL);

        store.insert(entry("first", 100));
        store.insert(entry("second", 100));
        store.insert(entry("third", 100));

        assert!(!store.contains("first"));
        assert!(store.contains("second"));
        assert!(store.contains("third"));
    }

    #[test]
    fn test_overwrite_keeps_insertion_slot() {
        let mut store = CacheStore::new(2, TTL);

        store.insert(entry("a", 100));
        store.insert(entry("b", 100));
        // Same timestamp, "a" keeps its first slot so it still loses the tie
        store.insert(entry("a", 100));
        store.insert(entry("c", 100));

        assert_eq!(store.urls(), vec!["b", "c"]);
    }

    #[test]
    fn test_evicted_handle_is_revoked() {
        let mut store = CacheStore::new(1, TTL);

        let a = store.insert(entry("a", 1)).unwrap();
        store.insert(entry("b", 2));

        assert!(store.resolve(&a.id).is_none());
    }

    #[test]
    fn test_zero_bound_evicts_new_entry() {
        let mut store = CacheStore::new(0, TTL);
        assert!(store.insert(entry("a", 1)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_all() {
        let mut store = CacheStore::new(50, TTL);
        let a = store.insert(entry("a", 1_000)).unwrap();
        store.insert(entry("b", 1_000));

        assert_eq!(store.clear_all(), 2);
        assert!(store.is_empty());
        assert!(store.get_at("a", 1_001).is_none());
        assert!(store.resolve(&a.id).is_none());

        // Clearing an empty table is a no-op
        assert_eq!(store.clear_all(), 0);
    }

    #[test]
    fn test_sweep_expired() {
        let mut store = CacheStore::new(50, TTL);
        store.insert(entry("old", 0));
        store.insert(entry("new", TTL));

        assert_eq!(store.sweep_expired_at(TTL), 1);
        assert_eq!(store.urls(), vec!["new"]);
    }

    #[test]
    fn test_snapshot_is_detached_from_table() {
        let mut store = CacheStore::new(50, TTL);
        store.insert(entry("a", 1));
        store.insert(entry("b", 2));

        let snapshot = store.snapshot();
        store.clear_all();

        assert_eq!(snapshot.len(), 2);
        let json = snapshot.to_json().unwrap();
        let mut restored = CacheStore::new(50, TTL);
        restored.restore(&json, 3).unwrap();
        assert_eq!(restored.urls(), vec!["a", "b"]);
    }

    #[test]
    fn test_serialize_restore_preserves_order() {
        let mut store = CacheStore::new(50, TTL);
        store.insert(entry("https://cdn.test/z.png", 5));
        store.insert(entry("https://cdn.test/a.png", 5));
        let json = store.to_json().unwrap();

        let mut restored = CacheStore::new(50, TTL);
        let report = restored.restore(&json, 10).unwrap();

        assert_eq!(report.loaded, 2);
        assert_eq!(
            restored.urls(),
            vec!["https://cdn.test/z.png", "https://cdn.test/a.png"]
        );
        let handle = restored.get_at("https://cdn.test/z.png", 10).unwrap();
        let (content, content_type) = restored.resolve(&handle.id).unwrap();
        assert_eq!(content, Bytes::from("https://cdn.test/z.png"));
        assert_eq!(content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_restore_drops_expired_at_boundary() {
        let now = 10 * TTL;
        let raw = format!(
            r#"{{
                "stale": {{"url": "stale", "blob": {{"data": ""}}, "timestamp": {}}},
                "edge": {{"url": "edge", "blob": {{"data": ""}}, "timestamp": {}}},
                "fresh": {{"url": "fresh", "blob": {{"data": ""}}, "timestamp": {}}}
            }}"#,
            now - TTL - 1,
            now - TTL,
            now - TTL + 1
        );

        let mut store = CacheStore::new(50, TTL);
        let report = store.restore(&raw, now).unwrap();

        assert_eq!(report.expired, 2);
        assert_eq!(report.loaded, 1);
        assert_eq!(store.urls(), vec!["fresh"]);
    }

    #[test]
    fn test_restore_skips_malformed_entries() {
        let raw = r#"{
            "bad": {"nope": true},
            "good": {"url": "good", "blob": {"data": "aGk="}, "timestamp": 5}
        }"#;

        let mut store = CacheStore::new(50, TTL);
        let report = store.restore(raw, 6).unwrap();

        assert_eq!(report.invalid, 1);
        assert_eq!(report.loaded, 1);
        assert!(store.contains("good"));
    }

    #[test]
    fn test_restore_rejects_non_object() {
        let mut store = CacheStore::new(50, TTL);
        let result = store.restore("[1, 2]", 0);
        assert!(matches!(result, Err(CacheError::Storage(_))));
    }

    #[test]
    fn test_restore_applies_size_bound() {
        let mut big = CacheStore::new(10, TTL);
        for i in 0..5 {
            big.insert(entry(&format!("u{}", i), i));
        }
        let json = big.to_json().unwrap();

        let mut small = CacheStore::new(2, TTL);
        small.restore(&json, 10).unwrap();

        assert_eq!(small.urls(), vec!["u3", "u4"]);
    }
}
