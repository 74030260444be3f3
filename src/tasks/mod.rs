//! Background Tasks Module
//!
//! Contains background tasks that run during server operation.
//!
//! # Tasks
//! - Expiry Sweep: Drops expired images at the configured interval
//! - Background writes: tracked fire-and-forget work that can be flushed

mod background;
mod sweep;

pub use background::BackgroundTasks;
pub use sweep::spawn_sweep_task;
