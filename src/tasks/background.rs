//! Background Task Group
//!
//! Fire-and-forget work (cache writes, storage flushes) that shutdown and
//! tests can wait on.

use std::future::Future;

use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

/// Tracks spawned tasks so callers can wait for everything started so far.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    /// Serializes `flush`: the tracker is shared state between close and reopen
    flushing: Mutex<()>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Waits for every task spawned before the call. Tasks spawned while
    /// waiting are tracked too and also waited for.
    pub async fn flush(&self) {
        let _flushing = self.flushing.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Number of tasks still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }
}
