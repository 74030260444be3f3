//! API Handlers
//!
//! HTTP request handlers for the image cache endpoints, the object-URL
//! resolver and the offline proxy fallback.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cache::{FileStorage, HttpFetcher, ImageCache, KeyValueStorage, PreloadReport};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, EnsureRequest, EnsureResponse, HealthResponse, LookupQuery, PreloadRequest,
    StatsResponse, ViewQuery,
};
use crate::proxy::{HttpNetwork, OfflineProxy, ProxyRequest, ProxySettings, ProxyStatus};
use crate::view::{CachedImage, ImageView};

/// Largest request body the proxy buffers before forwarding
const MAX_PROXY_BODY: usize = 10 * 1024 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide image cache
    pub images: ImageCache,
    /// Offline proxy answering every non-API request
    pub proxy: Arc<OfflineProxy>,
}

impl AppState {
    pub fn new(images: ImageCache, proxy: OfflineProxy) -> Self {
        Self {
            images,
            proxy: Arc::new(proxy),
        }
    }

    /// Wires file-backed storage and HTTP clients from configuration. The
    /// image table and the offline containers share one storage directory.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage: Arc<dyn KeyValueStorage> =
            Arc::new(FileStorage::new(config.storage_dir.clone()));
        let fetcher = HttpFetcher::new(config.fetch_timeout(), config.max_image_bytes)?
            .with_base(&config.origin_url)?;
        let images = ImageCache::from_config(config, storage.clone(), Arc::new(fetcher));

        let network = HttpNetwork::new(config.fetch_timeout())?;
        let proxy = OfflineProxy::with_storage(
            ProxySettings::from_config(config)?,
            Arc::new(network),
            storage,
        );

        Ok(Self::new(images, proxy))
    }
}

/// Handler for GET /api/images?url=
///
/// Looks up a fresh cached copy without touching the network.
pub async fn lookup_handler(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<EnsureResponse>> {
    let handle = state
        .images
        .get(&query.url)
        .await
        .ok_or_else(|| CacheError::NotFound(format!("Image '{}' is not cached", query.url)))?;

    Ok(Json(EnsureResponse::cached(handle)))
}

/// Handler for POST /api/images/ensure
///
/// Fetch failures are not errors here: the caller gets its URL back.
pub async fn ensure_handler(
    State(state): State<AppState>,
    Json(req): Json<EnsureRequest>,
) -> Result<Json<EnsureResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let response = match state.images.try_ensure(&req.url).await {
        Ok(handle) => EnsureResponse::cached(handle),
        Err(e) => {
            warn!("Image cache pass-through for {}: {}", req.url, e);
            EnsureResponse::pass_through(req.url)
        }
    };
    Ok(Json(response))
}

/// Handler for POST /api/images/preload
pub async fn preload_handler(
    State(state): State<AppState>,
    Json(req): Json<PreloadRequest>,
) -> Result<Json<PreloadReport>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    Ok(Json(state.images.preload_many(req.urls).await))
}

/// Handler for DELETE /api/images
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    let removed = state.images.clear_all().await;
    Json(ClearResponse::new(removed))
}

/// Handler for GET /api/images/stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.images.stats().await;
    Json(StatsResponse::new(&stats, state.images.in_flight()))
}

/// Handler for GET /api/images/view?url=&alt=
///
/// Resolves an image slot the way the page renders it.
pub async fn view_handler(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Json<ImageView> {
    let mut image = CachedImage::new(query.url.as_deref(), &query.alt);
    let view = image.load(&state.images, &CancellationToken::new()).await;
    Json(view.clone())
}

/// Handler for GET /blob/:id
///
/// Serves the bytes behind an object URL. Revoked ids are gone for good.
pub async fn blob_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let (content, content_type) = state
        .images
        .resolve(&id)
        .await
        .ok_or_else(|| CacheError::NotFound(format!("Object URL '{}' is not live", id)))?;

    let content_type = content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        Body::from(content),
    )
        .into_response())
}

/// Handler for GET /api/proxy/status
pub async fn proxy_status_handler(State(state): State<AppState>) -> Json<ProxyStatus> {
    Json(state.proxy.status().await)
}

/// Fallback handler: every request no other route claims goes through the
/// offline proxy.
///
/// Only the fronted origin is reachable. An absolute-form target naming any
/// other host is refused with 403 instead of being forwarded.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_PROXY_BODY).await {
        Ok(body) => body,
        Err(e) => {
            return CacheError::InvalidRequest(format!("unreadable request body: {}", e))
                .into_response()
        }
    };

    match ProxyRequest::from_parts(
        parts.method,
        &parts.uri,
        &parts.headers,
        body,
        state.proxy.origin(),
    ) {
        Ok(request) if !state.proxy.is_same_origin(&request.url) => {
            warn!("Refusing to proxy {} {}", request.method, request.url);
            let origin = request.url.origin().ascii_serialization();
            CacheError::Forbidden(format!("{} is not served by this proxy", origin)).into_response()
        }
        Ok(request) => state.proxy.handle(request).await.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
