//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a terminal node is up.
//!
//! # Tasks
//! - Sweeper: removes expired cache entries and re-applies eviction limits

mod sweeper;

pub use sweeper::spawn_sweeper;
