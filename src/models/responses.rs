//! Response DTOs for the image cache API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, ImageHandle};

/// Response body for GET /api/images and POST /api/images/ensure
#[derive(Debug, Clone, Serialize)]
pub struct EnsureResponse {
    /// Remote URL that was asked for
    pub url: String,
    /// Object URL when cached, otherwise the remote URL itself
    pub src: String,
    pub cached: bool,
}

impl EnsureResponse {
    pub fn cached(handle: ImageHandle) -> Self {
        Self {
            url: handle.source_url,
            src: handle.object_url,
            cached: true,
        }
    }

    /// The URL is handed back unchanged for the renderer to try directly.
    pub fn pass_through(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            src: url.clone(),
            url,
            cached: false,
        }
    }
}

/// Response body for GET /api/images/stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
    pub evictions: u64,
    /// Current number of cached images
    pub total_entries: usize,
    /// Fetches currently running
    pub in_flight: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    pub fn new(stats: &CacheStats, in_flight: usize) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            fetches: stats.fetches,
            fetch_failures: stats.fetch_failures,
            evictions: stats.evictions,
            total_entries: stats.total_entries,
            in_flight,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for DELETE /api/images
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    /// Entries removed from the table
    pub removed: usize,
}

impl ClearResponse {
    pub fn new(removed: usize) -> Self {
        Self {
            message: format!("Image cache cleared ({} entries)", removed),
            removed,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
