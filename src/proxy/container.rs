//! Response Container Module
//!
//! Named response caches keyed by request identity. One container per cache
//! generation; old generations are deleted wholesale on activation.
//!
//! Containers persist as one JSON document keyed by container name, each
//! holding a list of `{method, url, status, headers, body}` records with the
//! body base64 encoded.

use std::collections::{BTreeMap, HashMap};

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CacheError, Result};
use crate::proxy::ProxyResponse;

/// Request identity: method plus absolute URL (fragment dropped).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_string(),
            url: url.into(),
        }
    }
}

// == Response Cache ==
/// One named container. No TTL and no size bound.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    entries: HashMap<RequestKey, ProxyResponse>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `response`, replacing any earlier one for the same request.
    pub fn put(&mut self, key: RequestKey, response: ProxyResponse) {
        self.entries.insert(key, response);
    }

    pub fn match_request(&self, key: &RequestKey) -> Option<ProxyResponse> {
        self.entries.get(key).cloned()
    }

    pub fn delete(&mut self, key: &RequestKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Cache Storage ==
/// All named containers.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    caches: HashMap<String, ResponseCache>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a container, creating it when missing.
    pub fn open(&mut self, name: &str) -> &mut ResponseCache {
        self.caches.entry(name.to_string()).or_default()
    }

    pub fn get(&self, name: &str) -> Option<&ResponseCache> {
        self.caches.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Container names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.keys().cloned().collect();
        names.sort();
        names
    }

    // == Persistence ==
    pub fn to_json(&self) -> Result<String> {
        let document: BTreeMap<&str, Vec<PersistedResponse>> = self
            .caches
            .iter()
            .map(|(name, cache)| {
                let mut records: Vec<PersistedResponse> = cache
                    .entries
                    .iter()
                    .map(|(key, response)| PersistedResponse::new(key, response))
                    .collect();
                records.sort_by(|a, b| (&a.url, &a.method).cmp(&(&b.url, &b.method)));
                (name.as_str(), records)
            })
            .collect();
        Ok(serde_json::to_string(&document)?)
    }

    /// Rebuilds containers from [`CacheStorage::to_json`] output. Records
    /// that no longer decode are skipped with a warning.
    pub fn from_json(raw: &str) -> Result<Self> {
        let document: BTreeMap<String, Vec<PersistedResponse>> = serde_json::from_str(raw)?;
        let mut storage = Self::new();
        for (name, records) in document {
            let cache = storage.open(&name);
            for record in records {
                let url = record.url.clone();
                match record.into_entry() {
                    Ok((key, response)) => cache.put(key, response),
                    Err(e) => warn!("Skipping cached response {} in {}: {}", url, name, e),
                }
            }
        }
        Ok(storage)
    }
}

/// Stored form of one cached response.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedResponse {
    method: String,
    url: String,
    status: u16,
    #[serde(default)]
    headers: Vec<(String, String)>,
    body: String,
}

impl PersistedResponse {
    /// Header values that are not visible ASCII are dropped.
    fn new(key: &RequestKey, response: &ProxyResponse) -> Self {
        Self {
            method: key.method.clone(),
            url: key.url.clone(),
            status: response.status.as_u16(),
            headers: response
                .headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                })
                .collect(),
            body: STANDARD.encode(&response.body),
        }
    }

    fn into_entry(self) -> Result<(RequestKey, ProxyResponse)> {
        let status = StatusCode::from_u16(self.status).map_err(corrupt)?;
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            headers.append(
                HeaderName::from_bytes(name.as_bytes()).map_err(corrupt)?,
                HeaderValue::from_str(value).map_err(corrupt)?,
            );
        }
        let body = STANDARD.decode(self.body.as_bytes()).map_err(corrupt)?;

        let key = RequestKey {
            method: self.method,
            url: self.url,
        };
        Ok((
            key,
            ProxyResponse {
                status,
                headers,
                body: Bytes::from(body),
            },
        ))
    }
}

fn corrupt(err: impl std::fmt::Display) -> CacheError {
    CacheError::Storage(format!("corrupt cached response: {}", err))
}
