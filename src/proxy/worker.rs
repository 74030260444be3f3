//! Offline Worker Module
//!
//! Lifecycle and request handling of the offline proxy.
//!
//! ```text
//! Parsed -> Installing -> Installed -> Activating -> Activated
//! ```
//!
//! Install seeds the manifest leniently and skips waiting, so `start` runs
//! install and activate back to back. Only an activated worker intercepts
//! requests; before that everything passes straight through.
//!
//! A proxy built with [`OfflineProxy::with_storage`] reloads its containers on
//! startup and writes them back after install, activate and every cached
//! response, so a restart with the origin down still serves the last copy.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use futures::future::join_all;
use reqwest::Url;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{KeyValueStorage, SnapshotWriter};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::proxy::{
    CacheStorage, Network, ProxyRequest, ProxyResponse, RequestKey, BUILTIN_OFFLINE_PAGE,
    OFFLINE_STORAGE_KEY,
};
use crate::tasks::BackgroundTasks;

// == Worker State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Superseded by a newer generation. Not entered by this process.
    Redundant,
}

/// What the proxy fronts and how it seeds itself.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub origin: Url,
    pub cache_version: String,
    /// Asset paths, resolved against `origin`
    pub manifest: Vec<String>,
    pub offline_page: String,
}

impl ProxySettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let origin = Url::parse(&config.origin_url).map_err(|e| {
            CacheError::InvalidRequest(format!("invalid ORIGIN_URL {}: {}", config.origin_url, e))
        })?;
        Ok(Self {
            origin,
            cache_version: config.cache_version.clone(),
            manifest: config.offline_manifest.clone(),
            offline_page: config.offline_page.clone(),
        })
    }

    fn asset_url(&self, path: &str) -> Result<Url> {
        self.origin
            .join(path)
            .map_err(|e| CacheError::InvalidRequest(format!("bad asset path {}: {}", path, e)))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub seeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatus {
    pub state: WorkerState,
    pub cache_version: String,
    pub origin: String,
    pub containers: Vec<String>,
    pub cached_requests: usize,
}

// == Offline Proxy ==
pub struct OfflineProxy {
    settings: ProxySettings,
    network: Arc<dyn Network>,
    caches: Arc<RwLock<CacheStorage>>,
    state: RwLock<WorkerState>,
    /// Background cache writes
    writes: BackgroundTasks,
    /// Set when the containers are persisted
    writer: Option<SnapshotWriter>,
}

impl std::fmt::Debug for OfflineProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineProxy")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl OfflineProxy {
    pub fn new(settings: ProxySettings, network: Arc<dyn Network>) -> Self {
        Self::with_caches(settings, network, Arc::new(RwLock::new(CacheStorage::new())))
    }

    /// Builds a proxy over existing containers, e.g. ones left by an earlier
    /// generation.
    pub fn with_caches(
        settings: ProxySettings,
        network: Arc<dyn Network>,
        caches: Arc<RwLock<CacheStorage>>,
    ) -> Self {
        Self {
            settings,
            network,
            caches,
            state: RwLock::new(WorkerState::Parsed),
            writes: BackgroundTasks::new(),
            writer: None,
        }
    }

    /// Builds a proxy whose containers live in `storage`. Whatever an earlier
    /// process left there is loaded first; unreadable data is logged and the
    /// proxy starts empty.
    pub fn with_storage(
        settings: ProxySettings,
        network: Arc<dyn Network>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        let caches = match storage.get_item(OFFLINE_STORAGE_KEY) {
            Ok(Some(raw)) => match CacheStorage::from_json(&raw) {
                Ok(caches) => {
                    info!("Offline caches restored: {:?}", caches.keys());
                    caches
                }
                Err(e) => {
                    warn!("Ignoring unreadable offline caches: {}", e);
                    CacheStorage::new()
                }
            },
            Ok(None) => {
                debug!("No persisted offline caches found");
                CacheStorage::new()
            }
            Err(e) => {
                warn!("Failed to read offline caches: {}", e);
                CacheStorage::new()
            }
        };

        let mut proxy = Self::with_caches(settings, network, Arc::new(RwLock::new(caches)));
        proxy.writer = Some(SnapshotWriter::new(storage, OFFLINE_STORAGE_KEY));
        proxy
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub fn caches(&self) -> Arc<RwLock<CacheStorage>> {
        self.caches.clone()
    }

    pub fn cache_version(&self) -> &str {
        &self.settings.cache_version
    }

    /// Origin that origin-form request targets resolve against.
    pub fn origin(&self) -> &Url {
        &self.settings.origin
    }

    // == Start ==
    /// Install, then activate immediately.
    pub async fn start(&self) -> Result<InstallReport> {
        let report = self.install().await;
        self.activate().await?;
        Ok(report)
    }

    // == Install ==
    /// Seeds the current generation's container with the manifest.
    ///
    /// Assets are fetched concurrently and independently; a failure is logged
    /// and skipped, never aborting the install.
    pub async fn install(&self) -> InstallReport {
        self.set_state(WorkerState::Installing).await;
        let name = self.settings.cache_version.clone();
        self.caches.write().await.open(&name);

        let seeds = self
            .settings
            .manifest
            .iter()
            .map(|path| async move { (path, self.seed(path).await) });

        let mut report = InstallReport::default();
        for (path, outcome) in join_all(seeds).await {
            match outcome {
                Ok(()) => report.seeded += 1,
                Err(e) => {
                    warn!("Offline manifest asset {} not seeded: {}", path, e);
                    report.failed += 1;
                }
            }
        }
        {
            let caches = self.caches.write().await;
            persist(self.writer.as_ref(), &caches);
        }

        self.set_state(WorkerState::Installed).await;
        info!(
            "Offline cache {} installed: seeded={}, failed={}; skipping wait",
            name, report.seeded, report.failed
        );
        report
    }

    async fn seed(&self, path: &str) -> Result<()> {
        let request = ProxyRequest::get(self.settings.asset_url(path)?);
        let key = request.key();
        let response = self.network.send(request).await?;
        if response.status != StatusCode::OK {
            return Err(CacheError::Status {
                url: key.url,
                status: response.status.as_u16(),
            });
        }
        self.caches
            .write()
            .await
            .open(&self.settings.cache_version)
            .put(key, response);
        Ok(())
    }

    // == Activate ==
    /// Deletes every container from other generations and claims clients.
    /// Returns the number of containers deleted.
    pub async fn activate(&self) -> Result<usize> {
        {
            let mut state = self.state.write().await;
            if *state != WorkerState::Installed {
                return Err(CacheError::InvalidRequest(format!(
                    "cannot activate from state {:?}",
                    *state
                )));
            }
            *state = WorkerState::Activating;
        }

        let deleted = {
            let mut caches = self.caches.write().await;
            let stale: Vec<String> = caches
                .keys()
                .into_iter()
                .filter(|name| *name != self.settings.cache_version)
                .collect();
            for name in &stale {
                caches.delete(name);
                info!("Deleted stale offline cache {}", name);
            }
            if !stale.is_empty() {
                persist(self.writer.as_ref(), &caches);
            }
            stale.len()
        };

        self.set_state(WorkerState::Activated).await;
        info!("Offline proxy active for {}", self.settings.origin);
        Ok(deleted)
    }

    // == Handle ==
    /// Answers one request. Never fails: every branch ends in a response.
    pub async fn handle(&self, request: ProxyRequest) -> ProxyResponse {
        if self.state().await != WorkerState::Activated
            || request.method != Method::GET
            || !self.is_same_origin(&request.url)
        {
            return self.pass_through(request).await;
        }
        self.network_first(request).await
    }

    /// Whether `url` shares scheme, host and port with the fronted origin.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.settings.origin.origin()
    }

    async fn pass_through(&self, request: ProxyRequest) -> ProxyResponse {
        let url = request.url.clone();
        match self.network.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Pass-through request to {} failed: {}", url, e);
                ProxyResponse::text(StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
        }
    }

    async fn network_first(&self, request: ProxyRequest) -> ProxyResponse {
        let key = request.key();
        let navigation = request.is_navigation();

        match self.network.send(request).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    self.store_in_background(key, response.clone());
                }
                response
            }
            Err(e) => {
                debug!("Network failed for {}, using offline cache: {}", key.url, e);
                self.fallback(&key, navigation).await
            }
        }
    }

    /// Cache write that never blocks or fails the response.
    fn store_in_background(&self, key: RequestKey, response: ProxyResponse) {
        let caches = self.caches.clone();
        let writer = self.writer.clone();
        let name = self.settings.cache_version.clone();
        self.writes.spawn(async move {
            debug!("Caching {} {} in {}", key.method, key.url, name);
            let mut caches = caches.write().await;
            caches.open(&name).put(key, response);
            persist(writer.as_ref(), &caches);
        });
    }

    async fn fallback(&self, key: &RequestKey, navigation: bool) -> ProxyResponse {
        let caches = self.caches.read().await;
        let current = caches.get(&self.settings.cache_version);

        if let Some(hit) = current.and_then(|c| c.match_request(key)) {
            return hit;
        }

        if navigation {
            let offline = self
                .settings
                .asset_url(&self.settings.offline_page)
                .ok()
                .map(|url| RequestKey::new(&Method::GET, &url))
                .and_then(|offline_key| current.and_then(|c| c.match_request(&offline_key)));
            return offline.unwrap_or_else(|| {
                warn!("Offline page {} was never seeded", self.settings.offline_page);
                ProxyResponse::html(StatusCode::SERVICE_UNAVAILABLE, BUILTIN_OFFLINE_PAGE)
            });
        }

        ProxyResponse::text(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
    }

    // == Flush ==
    /// Waits for every background cache write started so far, then for the
    /// containers to reach storage.
    pub async fn flush(&self) {
        self.writes.flush().await;
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }

    pub async fn status(&self) -> ProxyStatus {
        let state = self.state().await;
        let caches = self.caches.read().await;
        ProxyStatus {
            state,
            cache_version: self.settings.cache_version.clone(),
            origin: self.settings.origin.to_string(),
            containers: caches.keys(),
            cached_requests: caches
                .get(&self.settings.cache_version)
                .map(|c| c.len())
                .unwrap_or(0),
        }
    }

    async fn set_state(&self, next: WorkerState) {
        let mut state = self.state.write().await;
        debug!("Offline proxy {:?} -> {:?}", *state, next);
        *state = next;
    }
}

/// Queues a write of every container. Call with the containers lock held so
/// writes keep mutation order.
fn persist(writer: Option<&SnapshotWriter>, caches: &CacheStorage) {
    if let Some(writer) = writer {
        let snapshot = caches.clone();
        writer.submit(move || snapshot.to_json().map(Some));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::header;
    use bytes::Bytes;
    use crate::cache::MemoryStorage;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    /// Scripted upstream: fixed path -> (status, body), toggled offline.
    #[derive(Default)]
    struct FakeNetwork {
        routes: HashMap<String, (StatusCode, &'static str)>,
        offline: AtomicBool,
        /// Latency added to every request
        delay: Option<Duration>,
    }

    impl FakeNetwork {
        fn with(routes: &[(&str, StatusCode, &'static str)]) -> Arc<Self> {
            Arc::new(Self {
                routes: route_table(routes),
                ..Self::default()
            })
        }

        fn slow(routes: &[(&str, StatusCode, &'static str)], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                routes: route_table(routes),
                delay: Some(delay),
                ..Self::default()
            })
        }

        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }
    }

    fn route_table(
        routes: &[(&str, StatusCode, &'static str)],
    ) -> HashMap<String, (StatusCode, &'static str)> {
        routes
            .iter()
            .map(|(path, status, body)| (path.to_string(), (*status, *body)))
            .collect()
    }

    #[async_trait]
    impl Network for FakeNetwork {
        async fn send(&self, request: ProxyRequest) -> Result<ProxyResponse> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.offline.load(Ordering::SeqCst) {
                return Err(CacheError::Fetch("network unreachable".to_string()));
            }
            let (status, body) = self
                .routes
                .get(request.url.path())
                .copied()
                .unwrap_or((StatusCode::NOT_FOUND, "not found"));
            Ok(ProxyResponse {
                status,
                headers: Default::default(),
                body: Bytes::from_static(body.as_bytes()),
            })
        }
    }

    fn settings() -> ProxySettings {
        ProxySettings {
            origin: Url::parse("http://portfolio.test").unwrap(),
            cache_version: "folio-v2".to_string(),
            manifest: vec![
                "/".to_string(),
                "/offline.html".to_string(),
                "/favicon.ico".to_string(),
                "/images/profile.jpg".to_string(),
            ],
            offline_page: "/offline.html".to_string(),
        }
    }

    fn full_site() -> Arc<FakeNetwork> {
        FakeNetwork::with(&[
            ("/", StatusCode::OK, "home"),
            ("/offline.html", StatusCode::OK, "offline page"),
            ("/favicon.ico", StatusCode::OK, "icon"),
            ("/images/profile.jpg", StatusCode::OK, "profile"),
            ("/projects", StatusCode::OK, "projects"),
            ("/api/skills", StatusCode::OK, "[]"),
            ("/moved", StatusCode::MOVED_PERMANENTLY, ""),
        ])
    }

    fn request(path: &str) -> ProxyRequest {
        ProxyRequest::get(Url::parse("http://portfolio.test").unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn test_start_reaches_activated() {
        let proxy = OfflineProxy::new(settings(), full_site());
        assert_eq!(proxy.state().await, WorkerState::Parsed);

        let report = proxy.start().await.unwrap();

        assert_eq!(report.seeded, 4);
        assert_eq!(report.failed, 0);
        assert_eq!(proxy.state().await, WorkerState::Activated);
        assert_eq!(proxy.status().await.cached_requests, 4);
    }

    #[tokio::test]
    async fn test_install_is_lenient_about_missing_assets() {
        // favicon 404s, profile image is a server error
        let network = FakeNetwork::with(&[
            ("/", StatusCode::OK, "home"),
            ("/offline.html", StatusCode::OK, "offline page"),
            ("/images/profile.jpg", StatusCode::INTERNAL_SERVER_ERROR, ""),
        ]);
        let proxy = OfflineProxy::new(settings(), network);

        let report = proxy.start().await.unwrap();

        assert_eq!(report.seeded, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(proxy.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_install_offline_still_activates() {
        let network = full_site();
        network.go_offline();
        let proxy = OfflineProxy::new(settings(), network);

        let report = proxy.start().await.unwrap();

        assert_eq!(report.failed, 4);
        assert_eq!(proxy.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_activate_sweeps_old_generations() {
        let caches = Arc::new(RwLock::new(CacheStorage::new()));
        {
            let mut storage = caches.write().await;
            storage.open("folio-v1").put(
                request("/").key(),
                ProxyResponse::text(StatusCode::OK, "old home"),
            );
            storage.open("unrelated");
        }
        let proxy = OfflineProxy::with_caches(settings(), full_site(), caches.clone());

        proxy.install().await;
        let deleted = proxy.activate().await.unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(caches.read().await.keys(), vec!["folio-v2"]);
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let proxy = OfflineProxy::new(settings(), full_site());
        assert!(proxy.activate().await.is_err());
        assert_eq!(proxy.state().await, WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_requests_pass_through_before_activation() {
        let network = full_site();
        let proxy = OfflineProxy::new(settings(), network.clone());

        let response = proxy.handle(request("/projects")).await;
        proxy.flush().await;

        assert_eq!(response.status, StatusCode::OK);
        assert!(!proxy.caches().read().await.has("folio-v2"));
    }

    #[tokio::test]
    async fn test_successful_get_is_served_from_cache_when_offline() {
        let network = full_site();
        let proxy = OfflineProxy::new(settings(), network.clone());
        proxy.start().await.unwrap();

        let online = proxy.handle(request("/projects")).await;
        assert_eq!(&online.body[..], b"projects");
        proxy.flush().await;

        network.go_offline();
        let offline = proxy.handle(request("/projects")).await;

        assert_eq!(offline.status, StatusCode::OK);
        assert_eq!(&offline.body[..], b"projects");
    }

    #[tokio::test]
    async fn test_only_status_200_is_cached() {
        let network = full_site();
        let proxy = OfflineProxy::new(settings(), network.clone());
        proxy.start().await.unwrap();

        let missing = proxy.handle(request("/nope")).await;
        let moved = proxy.handle(request("/moved")).await;
        proxy.flush().await;

        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(moved.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(proxy.status().await.cached_requests, 4);
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_offline_page() {
        let network = full_site();
        let proxy = OfflineProxy::new(settings(), network.clone());
        proxy.start().await.unwrap();
        network.go_offline();

        let nav = request("/blog/never-visited").with_header(header::ACCEPT, "text/html");
        let response = proxy.handle(nav).await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"offline page");
    }

    #[tokio::test]
    async fn test_offline_navigation_without_seeded_page_gets_builtin() {
        let network = FakeNetwork::with(&[("/", StatusCode::OK, "home")]);
        let proxy = OfflineProxy::new(settings(), network.clone());
        proxy.start().await.unwrap();
        network.go_offline();

        let nav = request("/about").with_header(header::ACCEPT, "text/html");
        let response = proxy.handle(nav).await;

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body, Bytes::from_static(BUILTIN_OFFLINE_PAGE.as_bytes()));
    }

    #[tokio::test]
    async fn test_offline_resource_gets_503_placeholder() {
        let network = full_site();
        let proxy = OfflineProxy::new(settings(), network.clone());
        proxy.start().await.unwrap();
        network.go_offline();

        let response = proxy.handle(request("/images/gallery/1.jpg")).await;

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(&response.body[..], b"Service Unavailable");
    }

    #[tokio::test]
    async fn test_seeded_asset_served_offline() {
        let network = full_site();
        let proxy = OfflineProxy::new(settings(), network.clone());
        proxy.start().await.unwrap();
        network.go_offline();

        let response = proxy.handle(request("/images/profile.jpg")).await;

        assert_eq!(&response.body[..], b"profile");
    }

    #[tokio::test]
    async fn test_non_get_bypasses_cache() {
        let network = full_site();
        let proxy = OfflineProxy::new(settings(), network.clone());
        proxy.start().await.unwrap();

        let mut post = request("/projects");
        post.method = Method::POST;
        proxy.handle(post.clone()).await;
        proxy.flush().await;
        assert_eq!(proxy.status().await.cached_requests, 4);

        network.go_offline();
        let response = proxy.handle(post).await;
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_cross_origin_bypasses_cache() {
        let network = full_site();
        let proxy = OfflineProxy::new(settings(), network.clone());
        proxy.start().await.unwrap();

        let foreign = ProxyRequest::get(Url::parse("https://cdn.example/projects").unwrap());
        proxy.handle(foreign.clone()).await;
        proxy.flush().await;
        assert_eq!(proxy.status().await.cached_requests, 4);

        network.go_offline();
        let response = proxy.handle(foreign).await;
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_status_reports_generation() {
        let proxy = OfflineProxy::new(settings(), full_site());
        proxy.start().await.unwrap();

        let status = proxy.status().await;

        assert_eq!(status.state, WorkerState::Activated);
        assert_eq!(status.cache_version, "folio-v2");
        assert_eq!(status.containers, vec!["folio-v2"]);
        assert_eq!(status.origin, "http://portfolio.test/");
    }

    #[tokio::test]
    async fn test_install_seeds_assets_concurrently() {
        let network = FakeNetwork::slow(
            &[
                ("/", StatusCode::OK, "home"),
                ("/offline.html", StatusCode::OK, "offline page"),
                ("/favicon.ico", StatusCode::OK, "icon"),
                ("/images/profile.jpg", StatusCode::OK, "profile"),
            ],
            Duration::from_millis(200),
        );
        let proxy = OfflineProxy::new(settings(), network);

        let started = Instant::now();
        let report = proxy.start().await.unwrap();

        assert_eq!(report.seeded, 4);
        // Four sequential fetches would take at least 800ms
        assert!(
            started.elapsed() < Duration::from_millis(600),
            "install took {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn test_containers_reload_from_storage() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let network = full_site();

        let first = OfflineProxy::with_storage(settings(), network.clone(), storage.clone());
        first.start().await.unwrap();
        first.handle(request("/projects")).await;
        first.flush().await;
        assert!(storage.get_item(OFFLINE_STORAGE_KEY).unwrap().is_some());

        network.go_offline();
        let second = OfflineProxy::with_storage(settings(), network.clone(), storage.clone());
        assert_eq!(second.status().await.cached_requests, 5);
        second.start().await.unwrap();

        let response = second.handle(request("/projects")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"projects");
    }

    #[tokio::test]
    async fn test_new_generation_drops_persisted_old_one() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let old_settings = ProxySettings {
            cache_version: "folio-v1".to_string(),
            ..settings()
        };
        let old = OfflineProxy::with_storage(old_settings, full_site(), storage.clone());
        old.start().await.unwrap();
        old.flush().await;

        let current = OfflineProxy::with_storage(settings(), full_site(), storage.clone());
        assert_eq!(current.caches().read().await.keys(), vec!["folio-v1"]);
        current.start().await.unwrap();
        current.flush().await;

        let raw = storage.get_item(OFFLINE_STORAGE_KEY).unwrap().unwrap();
        assert_eq!(CacheStorage::from_json(&raw).unwrap().keys(), vec!["folio-v2"]);
    }

    #[tokio::test]
    async fn test_unreadable_storage_starts_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(OFFLINE_STORAGE_KEY, "not json").unwrap();

        let proxy = OfflineProxy::with_storage(settings(), full_site(), storage);

        assert!(proxy.status().await.containers.is_empty());
        proxy.start().await.unwrap();
        assert_eq!(proxy.status().await.cached_requests, 4);
    }

    #[tokio::test]
    async fn test_concurrent_flushes_see_every_write() {
        let network = full_site();
        let proxy = OfflineProxy::new(settings(), network.clone());
        proxy.start().await.unwrap();

        for path in ["/projects", "/api/skills"] {
            proxy.handle(request(path)).await;
        }
        tokio::join!(proxy.flush(), proxy.flush());

        assert_eq!(proxy.status().await.cached_requests, 6);
        network.go_offline();
        assert_eq!(&proxy.handle(request("/api/skills")).await.body[..], b"[]");
    }
}
