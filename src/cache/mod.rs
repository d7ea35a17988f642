//! Cache Module
//!
//! Keyed query cache with per-pattern TTL, bounded size and request coalescing.

mod entry;
mod eviction;
mod executor;
mod order;
mod stats;
mod store;
mod ttl;


// Re-export public types
pub use entry::{estimate_size, CacheEntry, FALLBACK_ENTRY_SIZE};
pub use eviction::{EvictionPolicy, EvictionReport};
pub use executor::{ExecuteOptions, QueryCache, WeakQueryCache};
pub use order::InsertionOrder;
pub use stats::{CacheStats, Counters};
pub use store::TtlStore;
pub use ttl::{TtlResolver, TtlRule};
