//! Cache Statistics Module
//!
//! Running counters plus the point-in-time snapshot returned by `stats()`.

use std::collections::BTreeMap;

use serde::Serialize;

// == Counters ==
/// Monotonic counters maintained under the cache lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub evictions: u64,
    pub expired: u64,
}

impl Counters {
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// A caller attached to an in-flight request instead of starting one.
    pub fn record_coalesced(&mut self) {
        self.coalesced += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_expired(&mut self, count: usize) {
        self.expired += count as u64;
    }
}

// == Cache Stats ==
/// Snapshot of cache state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Entries currently stored
    pub entry_count: usize,
    /// Producer calls currently outstanding (or inside their dedup window)
    pub pending_count: usize,
    /// Best-effort byte estimate of all stored values
    pub estimated_memory_bytes: usize,
    /// Age of every stored entry in milliseconds
    pub per_key_age_ms: BTreeMap<String, u64>,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub evictions: u64,
    pub expired: u64,
}

impl CacheStats {
    pub fn with_counters(mut self, counters: Counters) -> Self {
        self.hits = counters.hits;
        self.misses = counters.misses;
        self.coalesced = counters.coalesced;
        self.evictions = counters.evictions;
        self.expired = counters.expired;
        self
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
