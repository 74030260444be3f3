//! Configuration Module
//!
//! Handles loading and managing service configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL_SECS};
use crate::proxy::{DEFAULT_CACHE_VERSION, DEFAULT_MANIFEST, DEFAULT_OFFLINE_PAGE};

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of images the cache can hold
    pub max_entries: usize,
    /// Age in seconds after which a cached image is stale
    pub cache_ttl: u64,
    /// Directory backing the persisted key-value storage
    pub storage_dir: PathBuf,
    /// HTTP server port
    pub server_port: u16,
    /// Background expiry sweep interval in seconds, 0 disables the sweep
    pub sweep_interval: u64,
    /// Timeout in seconds for a single image or upstream fetch
    pub fetch_timeout: u64,
    /// Largest image body accepted into the cache, in bytes
    pub max_image_bytes: usize,
    /// Origin the offline proxy fronts
    pub origin_url: String,
    /// Offline cache generation name
    pub cache_version: String,
    /// Assets seeded into the offline cache at install time
    pub offline_manifest: Vec<String>,
    /// Document served to navigations when offline
    pub offline_page: String,
    /// Image URLs preloaded at startup
    pub preload_urls: Vec<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum cached images (default: 50)
    /// - `CACHE_TTL_SECS` - Image TTL in seconds (default: 86400)
    /// - `STORAGE_DIR` - Persisted storage directory (default: `.folio-cache`)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SWEEP_INTERVAL` - Expiry sweep frequency in seconds (default: 300)
    /// - `FETCH_TIMEOUT_SECS` - Fetch timeout in seconds (default: 15)
    /// - `MAX_IMAGE_BYTES` - Largest cacheable image (default: 10 MiB)
    /// - `ORIGIN_URL` - Proxied origin (default: `http://127.0.0.1:8080`)
    /// - `CACHE_VERSION` - Offline cache generation (default: `folio-v1`)
    /// - `OFFLINE_MANIFEST` - Comma separated asset paths seeded at install
    /// - `OFFLINE_PAGE` - Offline fallback document (default: `/offline.html`)
    /// - `PRELOAD_URLS` - Comma separated image URLs preloaded at startup
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: parsed("MAX_ENTRIES").unwrap_or(defaults.max_entries),
            cache_ttl: parsed("CACHE_TTL_SECS").unwrap_or(defaults.cache_ttl),
            storage_dir: env::var("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            server_port: parsed("SERVER_PORT").unwrap_or(defaults.server_port),
            sweep_interval: parsed("SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
            fetch_timeout: parsed("FETCH_TIMEOUT_SECS").unwrap_or(defaults.fetch_timeout),
            max_image_bytes: parsed("MAX_IMAGE_BYTES").unwrap_or(defaults.max_image_bytes),
            origin_url: env::var("ORIGIN_URL").unwrap_or(defaults.origin_url),
            cache_version: env::var("CACHE_VERSION").unwrap_or(defaults.cache_version),
            offline_manifest: list("OFFLINE_MANIFEST").unwrap_or(defaults.offline_manifest),
            offline_page: env::var("OFFLINE_PAGE").unwrap_or(defaults.offline_page),
            preload_urls: list("PRELOAD_URLS").unwrap_or_default(),
        }
    }

    /// TTL as a millisecond count, the unit entry timestamps use.
    pub fn ttl_ms(&self) -> u64 {
        self.cache_ttl.saturating_mul(1000)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            cache_ttl: DEFAULT_TTL_SECS,
            storage_dir: PathBuf::from(".folio-cache"),
            server_port: 3000,
            sweep_interval: 300,
            fetch_timeout: 15,
            max_image_bytes: 10 * 1024 * 1024,
            origin_url: "http://127.0.0.1:8080".to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            offline_manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
            offline_page: DEFAULT_OFFLINE_PAGE.to_string(),
            preload_urls: Vec::new(),
        }
    }
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Comma separated list, empty items dropped. An empty variable yields `None`.
fn list(name: &str) -> Option<Vec<String>> {
    let raw = env::var(name).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
