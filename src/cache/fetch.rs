//! Image Fetch Module
//!
//! Network seam for the image cache. `HttpFetcher` is the reqwest-backed
//! implementation; tests plug in their own [`ImageFetcher`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, Url};
use tracing::debug;

use crate::error::{CacheError, Result};

/// Body and media type of a successfully fetched image.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub content: Bytes,
    pub content_type: Option<String>,
}

// == Image Fetcher ==
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetches `url`. Transport errors and non-success statuses are both
    /// failures.
    async fn fetch(&self, url: &str) -> Result<FetchedImage>;
}

// == HTTP Fetcher ==
/// Fetches images over HTTP(S) with a timeout and a body size cap.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
    /// Base for relative image references such as `img/a.png`
    base: Option<Url>,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("folio-cache/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base: None,
            max_bytes,
        })
    }

    /// Resolves relative URLs against `base` instead of rejecting them.
    pub fn with_base(mut self, base: &str) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| CacheError::InvalidRequest(format!("invalid base URL {}: {}", base, e)))?;
        self.base = Some(base);
        Ok(self)
    }

    fn resolve(&self, url: &str) -> Result<Url> {
        let parsed = match &self.base {
            Some(base) => base.join(url),
            None => Url::parse(url),
        };
        parsed.map_err(|e| CacheError::Fetch(format!("unusable URL {}: {}", url, e)))
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let target = self.resolve(url)?;
        debug!("Fetching image {}", target);

        let response = self.http.get(target).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_bytes {
                return Err(CacheError::Fetch(format!(
                    "{} is {} bytes, over the {} byte limit",
                    url, len, self.max_bytes
                )));
            }
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let content = response.bytes().await?;
        if content.len() > self.max_bytes {
            return Err(CacheError::Fetch(format!(
                "{} exceeds the {} byte limit",
                url, self.max_bytes
            )));
        }

        Ok(FetchedImage {
            content,
            content_type,
        })
    }
}
