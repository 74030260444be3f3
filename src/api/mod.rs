//! API Module
//!
//! HTTP handlers and routing for the image cache and offline proxy.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `/api/images...` - Image cache operations
//! - `GET /blob/:id` - Object URL content
//! - `GET /api/proxy/status` - Offline proxy status
//! - everything else - Offline proxy

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
