//! Cache Entry Module
//!
//! Defines a cached image and its persisted JSON shape.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// A fetched image keyed by its remote URL.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Original remote address, the table key
    pub url: String,
    /// Raw image bytes
    pub content: Bytes,
    /// Media type reported when the image was fetched
    pub content_type: Option<String>,
    /// Creation timestamp (Unix milliseconds)
    pub timestamp: u64,
    /// Object URL id minted for this entry, never persisted
    pub(crate) handle: Option<String>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry stamped with the current time.
    pub fn new(url: impl Into<String>, content: Bytes, content_type: Option<String>) -> Self {
        Self::with_timestamp(url, content, content_type, current_timestamp_ms())
    }

    pub fn with_timestamp(
        url: impl Into<String>,
        content: Bytes,
        content_type: Option<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            url: url.into(),
            content,
            content_type,
            timestamp,
            handle: None,
        }
    }

    // == Is Expired ==
    /// Checks whether the entry is older than `ttl_ms` at `now`.
    ///
    /// Boundary condition: an entry whose age equals the TTL is expired.
    /// Timestamps from the future (clock skew) count as age zero.
    pub fn is_expired_at(&self, now: u64, ttl_ms: u64) -> bool {
        now.saturating_sub(self.timestamp) >= ttl_ms
    }

    /// Age in milliseconds at `now`.
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}

// == Persisted Shape ==
/// JSON form of an entry: `{url, blob: {type, data}, timestamp}`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedEntry {
    pub url: String,
    pub blob: PersistedBlob,
    pub timestamp: u64,
}

/// Serializable stand-in for a binary blob, content base64 encoded.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedBlob {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub data: String,
}

impl From<&CacheEntry> for PersistedEntry {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            url: entry.url.clone(),
            blob: PersistedBlob {
                content_type: entry.content_type.clone(),
                data: STANDARD.encode(&entry.content),
            },
            timestamp: entry.timestamp,
        }
    }
}

impl TryFrom<PersistedEntry> for CacheEntry {
    type Error = base64::DecodeError;

    fn try_from(persisted: PersistedEntry) -> Result<Self, Self::Error> {
        let content = STANDARD.decode(persisted.blob.data.as_bytes())?;
        Ok(CacheEntry::with_timestamp(
            persisted.url,
            Bytes::from(content),
            persisted.blob.content_type,
            persisted.timestamp,
        ))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: u64 = 24 * 60 * 60 * 1000;

    #[test]
    fn test_entry_creation() {
        let before = current_timestamp_ms();
        let entry = CacheEntry::new("https://cdn.test/a.png", Bytes::from_static(b"png"), None);

        assert_eq!(entry.url, "https://cdn.test/a.png");
        assert_eq!(&entry.content[..], b"png");
        assert!(entry.timestamp >= before);
        assert!(entry.handle.is_none());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::with_timestamp("u", Bytes::new(), None, 1_000);

        assert!(!entry.is_expired_at(1_000 + DAY_MS - 1, DAY_MS));
        assert!(entry.is_expired_at(1_000 + DAY_MS, DAY_MS), "exactly at TTL is expired");
        assert!(entry.is_expired_at(1_000 + DAY_MS + 1, DAY_MS));
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let entry = CacheEntry::with_timestamp("u", Bytes::new(), None, 5_000);

        assert_eq!(entry.age_ms(1_000), 0);
        assert!(!entry.is_expired_at(1_000, DAY_MS));
    }

    #[test]
    fn test_persisted_shape() {
        let entry = CacheEntry::with_timestamp(
            "https://cdn.test/a.png",
            Bytes::from_static(b"\x89PNG"),
            Some("image/png".to_string()),
            42,
        );

        let json = serde_json::to_value(PersistedEntry::from(&entry)).unwrap();
        assert_eq!(json["url"], "https://cdn.test/a.png");
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["blob"]["type"], "image/png");
        assert_eq!(json["blob"]["data"], "iVBORw==");

        let restored: PersistedEntry = serde_json::from_value(json).unwrap();
        let restored = CacheEntry::try_from(restored).unwrap();
        assert_eq!(restored.content, entry.content);
        assert_eq!(restored.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_persisted_blob_without_type() {
        let json = r#"{"url":"u","blob":{"data":""},"timestamp":1}"#;
        let persisted: PersistedEntry = serde_json::from_str(json).unwrap();
        let entry = CacheEntry::try_from(persisted).unwrap();

        assert!(entry.content.is_empty());
        assert!(entry.content_type.is_none());
    }

    #[test]
    fn test_persisted_bad_base64_rejected() {
        let json = r#"{"url":"u","blob":{"data":"***"},"timestamp":1}"#;
        let persisted: PersistedEntry = serde_json::from_str(json).unwrap();
        assert!(CacheEntry::try_from(persisted).is_err());
    }
}
