//! Error types for the cache service
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the image cache and the offline proxy.
///
/// Fetch and storage failures are normally swallowed by policy (logged, then
/// degraded to a pass-through); they only reach a caller through the admin
/// API or the internal seams that report them.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Resource not found (unknown object URL, cache miss on an explicit lookup)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request target the service refuses to reach (another host through the proxy)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Network unreachable or transport failure
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Upstream answered with a non-success status
    #[error("Upstream returned status {status} for {url}")]
    Status { url: String, status: u16 },

    /// Persisted storage read/write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Caller stopped observing an in-flight operation
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Storage(format!("serialization failed: {}", err))
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Fetch(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Forbidden(_) => StatusCode::FORBIDDEN,
            CacheError::Fetch(_) | CacheError::Status { .. } => StatusCode::BAD_GATEWAY,
            CacheError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Storage(_) | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache service.
pub type Result<T> = std::result::Result<T, CacheError>;
