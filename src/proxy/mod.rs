//! Offline Proxy Module
//!
//! Network-first request interception for the portfolio origin, with a
//! versioned response cache as the offline fallback.

mod container;
mod network;
mod worker;

pub use container::{CacheStorage, RequestKey, ResponseCache};
pub use network::{HttpNetwork, Network, ProxyRequest, ProxyResponse};
pub use worker::{InstallReport, OfflineProxy, ProxySettings, ProxyStatus, WorkerState};

// == Public Constants ==
/// Cache generation; bump on deploy to drop every older offline cache
pub const DEFAULT_CACHE_VERSION: &str = "folio-v1";

/// Storage key the response containers are persisted under
pub const OFFLINE_STORAGE_KEY: &str = "offlineCaches";

/// Offline page served to navigations that miss both network and cache
pub const DEFAULT_OFFLINE_PAGE: &str = "/offline.html";

/// Assets seeded at install: home document, offline page, icon, profile image
pub const DEFAULT_MANIFEST: [&str; 4] = ["/", "/offline.html", "/favicon.ico", "/images/profile.jpg"];

/// Last-resort offline document when the configured page was never seeded
pub const BUILTIN_OFFLINE_PAGE: &str = "<!doctype html>\
<html><head><meta charset=\"utf-8\"><title>Offline</title></head>\
<body><h1>You are offline</h1><p>This page is not available offline. \
Reconnect and try again.</p></body></html>";
