//! Image Cache Module
//!
//! Bounded, TTL-filtered cache of fetched images, persisted to key-value
//! storage and exposed to callers as local object URLs.

mod entry;
mod fetch;
mod order;
mod service;
mod stats;
mod storage;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use fetch::{FetchedImage, HttpFetcher, ImageFetcher};
pub use order::InsertionOrder;
pub use service::{ImageCache, PreloadOutcome, PreloadReport};
pub use stats::CacheStats;
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, SnapshotWriter};
pub use store::{CacheStore, ImageHandle, RestoreReport, TableSnapshot};

// == Public Constants ==
/// Storage key the whole table is persisted under
pub const STORAGE_KEY: &str = "imageCache";

/// Default size bound of the table
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Default image TTL in seconds (24 hours)
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

/// Route prefix object URLs are served under
pub const BLOB_ROUTE_PREFIX: &str = "/blob/";
