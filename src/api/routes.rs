//! API Routes
//!
//! Configures the Axum router: image cache endpoints, object URLs and the
//! offline proxy as the fallback for everything else.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    blob_handler, clear_handler, ensure_handler, health_handler, lookup_handler, preload_handler,
    proxy_handler, proxy_status_handler, stats_handler, view_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check endpoint
/// - `GET /api/images?url=` - Fresh cached copy, no network
/// - `DELETE /api/images` - Clear the image cache
/// - `POST /api/images/ensure` - Cache an image, or pass its URL through
/// - `POST /api/images/preload` - Ensure a batch concurrently
/// - `GET /api/images/stats` - Cache statistics
/// - `GET /api/images/view?url=&alt=` - Render state of an image slot
/// - `GET /blob/:id` - Content behind an object URL
/// - `GET /api/proxy/status` - Offline proxy lifecycle and containers
/// - anything else - Offline proxy
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/images", get(lookup_handler).delete(clear_handler))
        .route("/api/images/ensure", post(ensure_handler))
        .route("/api/images/preload", post(preload_handler))
        .route("/api/images/stats", get(stats_handler))
        .route("/api/images/view", get(view_handler))
        .route("/blob/:id", get(blob_handler))
        .route("/api/proxy/status", get(proxy_status_handler))
        .fallback(proxy_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
