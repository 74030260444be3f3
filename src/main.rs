//! Folio Cache - image cache and offline proxy for a portfolio site
//!
//! Serves cached images as object URLs and fronts the site origin with a
//! network-first offline proxy.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio_cache::api::create_router;
use folio_cache::{spawn_sweep_task, AppState, Config};

/// Main entry point for the Folio Cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the image cache (restoring the persisted table) and the proxy
/// 4. Preload configured images in the background
/// 5. Start the background expiry sweep and bind the listener
/// 6. Install and activate the offline proxy in the background; requests
///    pass straight through until it is active
/// 7. Serve until SIGINT/SIGTERM, then flush both caches
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Folio Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, ttl={}s, port={}, origin={}, cache_version={}",
        config.max_entries,
        config.cache_ttl,
        config.server_port,
        config.origin_url,
        config.cache_version
    );

    let state = AppState::from_config(&config).context("failed to build application state")?;

    if !config.preload_urls.is_empty() {
        let images = state.images.clone();
        let urls = config.preload_urls.clone();
        tokio::spawn(async move {
            let report = images.preload_many(urls).await;
            info!(
                "Startup preload finished: succeeded={}, failed={}",
                report.succeeded, report.failed
            );
        });
    }

    let sweep_handle = spawn_sweep_task(state.images.clone(), config.sweep_interval);

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    let proxy = state.proxy.clone();
    tokio::spawn(async move {
        match proxy.start().await {
            Ok(report) => info!(
                "Offline proxy {} ready: seeded={}, failed={}",
                proxy.cache_version(),
                report.seeded,
                report.failed
            ),
            Err(e) => warn!("Offline proxy not activated, passing requests through: {}", e),
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sweep_handle))
        .await
        .context("server error")?;

    state.proxy.flush().await;
    state.images.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the sweep.
async fn shutdown_signal(sweep_handle: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Some(handle) = sweep_handle {
        handle.abort();
        warn!("Expiry sweep aborted");
    }
}
