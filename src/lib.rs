//! POS Sync Cache - client-side query cache and cross-terminal sync
//!
//! Sits between point-of-sale screens and the backend: decides when a fetch
//! really happens, coalesces identical concurrent requests, bounds memory,
//! expires data per data class, and keeps tracked collections consistent
//! across terminals through idempotent mutation events.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod sync;
pub mod tasks;

pub use api::AppState;
pub use cache::{ExecuteOptions, QueryCache};
pub use config::{CacheConfig, Config};
pub use error::{CacheError, SyncError};
pub use sync::{Record, SyncBinding, SyncBus, TrackedCollection};
pub use tasks::spawn_sweeper;
