//! Expiry Sweep Task
//!
//! Background task that periodically drops expired images, so stale content
//! and its object URLs do not linger until the next fetch replaces them.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::ImageCache;

/// Spawns a background task that sweeps expired images every
/// `interval_secs` seconds.
///
/// Returns `None` when `interval_secs` is 0 (sweeping disabled). The returned
/// handle is aborted during graceful shutdown.
pub fn spawn_sweep_task(images: ImageCache, interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        info!("Expiry sweep disabled");
        return None;
    }
    let period = Duration::from_secs(interval_secs);

    Some(tokio::spawn(async move {
        info!("Starting expiry sweep with interval of {} seconds", interval_secs);

        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately; startup already filtered on load
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed = images.sweep_expired().await;
            if removed > 0 {
                info!("Expiry sweep: removed {} expired images", removed);
            } else {
                debug!("Expiry sweep: no expired images found");
            }
        }
    }))
}
