//! Folio Cache - image cache and offline proxy for a portfolio site
//!
//! Keeps remote images as locally served object URLs with a TTL and a size
//! bound, and fronts the site with a network-first proxy that falls back to
//! cached responses when the origin is unreachable.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod tasks;
pub mod view;

pub use api::AppState;
pub use config::Config;
pub use tasks::spawn_sweep_task;
