//! Network Module
//!
//! Request/response types the proxy works with and the upstream seam.
//! `HttpNetwork` forwards over reqwest without following redirects, so the
//! browser sees exactly what the origin answered.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use reqwest::{redirect, Client, Url};

use crate::error::{CacheError, Result};
use crate::proxy::RequestKey;

/// Headers that describe one connection and never cross a proxy.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

// == Proxy Request ==
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Absolute target URL
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    /// Bare GET for `url`, as used for manifest seeding.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Builds a request from an incoming one. Origin-form URIs are resolved
    /// against `origin`; absolute-form URIs keep their own authority.
    pub fn from_parts(
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
        origin: &Url,
    ) -> Result<Self> {
        let parsed = if uri.scheme().is_some() && uri.authority().is_some() {
            Url::parse(&uri.to_string())
        } else {
            let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
            origin.join(path)
        };
        let url = parsed
            .map_err(|e| CacheError::InvalidRequest(format!("bad request target {}: {}", uri, e)))?;

        Ok(Self {
            method,
            url,
            headers: strip_hop_by_hop(headers),
            body,
        })
    }

    pub fn with_header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    /// Whether this is a top-level page navigation.
    ///
    /// Uses `Sec-Fetch-Mode` when the client sent it, otherwise treats a GET
    /// that accepts HTML as a navigation.
    pub fn is_navigation(&self) -> bool {
        if let Some(mode) = self.headers.get("sec-fetch-mode") {
            return mode.as_bytes().eq_ignore_ascii_case(b"navigate");
        }
        self.method == Method::GET
            && self
                .headers
                .get(header::ACCEPT)
                .and_then(|v| v.to_str().ok())
                .map(|accept| accept.contains("text/html"))
                .unwrap_or(false)
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

// == Proxy Response ==
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    /// A plain-text response with the given status.
    pub fn text(status: StatusCode, body: &'static str) -> Self {
        Self::with_type(status, "text/plain; charset=utf-8", Bytes::from_static(body.as_bytes()))
    }

    pub fn html(status: StatusCode, body: &'static str) -> Self {
        Self::with_type(status, "text/html; charset=utf-8", Bytes::from_static(body.as_bytes()))
    }

    fn with_type(status: StatusCode, content_type: &'static str, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            status,
            headers,
            body,
        }
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = strip_hop_by_hop(&self.headers);
        // The body length is known; let hyper compute it
        response.headers_mut().remove(header::CONTENT_LENGTH);
        response
    }
}

// == Network ==
/// Upstream the proxy forwards to. `Err` means the request never got an
/// answer (offline, DNS, refused, timeout); HTTP error statuses are `Ok`.
#[async_trait]
pub trait Network: Send + Sync {
    async fn send(&self, request: ProxyRequest) -> Result<ProxyResponse>;
}

/// reqwest-backed [`Network`].
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    http: Client,
}

impl HttpNetwork {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| CacheError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn send(&self, request: ProxyRequest) -> Result<ProxyResponse> {
        let response = self
            .http
            .request(request.method, request.url)
            .headers(strip_hop_by_hop(&request.headers))
            .body(request.body)
            .send()
            .await?;

        let status = response.status();
        let headers = strip_hop_by_hop(response.headers());
        let body = response.bytes().await?;

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(name);
    }
    out
}
