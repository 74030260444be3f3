//! Request DTOs for the image cache API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;

/// Longest image URL the API accepts
const MAX_URL_LEN: usize = 2048;

/// Most URLs a single preload request may carry
const MAX_PRELOAD_URLS: usize = 100;

/// Request body for POST /api/images/ensure
#[derive(Debug, Clone, Deserialize)]
pub struct EnsureRequest {
    /// Remote image URL
    pub url: String,
}

impl EnsureRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_url(&self.url)
    }
}

/// Request body for POST /api/images/preload
#[derive(Debug, Clone, Deserialize)]
pub struct PreloadRequest {
    pub urls: Vec<String>,
}

impl PreloadRequest {
    pub fn validate(&self) -> Option<String> {
        if self.urls.len() > MAX_PRELOAD_URLS {
            return Some(format!(
                "Preload accepts at most {} URLs, got {}",
                MAX_PRELOAD_URLS,
                self.urls.len()
            ));
        }
        self.urls.iter().find_map(|url| validate_url(url))
    }
}

/// Query string for GET /api/images
#[derive(Debug, Clone, Deserialize)]
pub struct LookupQuery {
    pub url: String,
}

/// Query string for GET /api/images/view
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub url: Option<String>,
    /// Alt text the fallback glyph is derived from
    #[serde(default)]
    pub alt: String,
}

fn validate_url(url: &str) -> Option<String> {
    if url.trim().is_empty() {
        return Some("URL cannot be empty".to_string());
    }
    if url.len() > MAX_URL_LEN {
        return Some(format!("URL exceeds maximum length of {} characters", MAX_URL_LEN));
    }
    None
}
