//! Eviction Policy Module
//!
//! Bounds the TTL store by entry count and by estimated memory.

use tracing::warn;

use crate::cache::TtlStore;

// == Eviction Report ==
/// What a single enforcement pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entries dropped because the store held too many
    pub by_count: usize,
    /// Entries dropped because the store was over its memory limit
    pub by_memory: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.by_count + self.by_memory
    }
}

// == Eviction Policy ==
#[derive(Debug, Clone, Copy)]
pub struct EvictionPolicy {
    max_entries: usize,
    max_memory_bytes: usize,
}

impl EvictionPolicy {
    pub fn new(max_entries: usize, max_memory_bytes: usize) -> Self {
        Self {
            max_entries,
            max_memory_bytes,
        }
    }

    // == Enforce ==
    /// Applies both limits to `store`.
    ///
    /// Count: drop the oldest-written entries until at or under `max_entries`.
    /// Memory: when over `max_memory_bytes`, drop least-recently-accessed
    /// entries until usage is at or below half the limit, so a burst of writes
    /// does not trigger an eviction on every single write.
    pub fn enforce(&self, store: &mut TtlStore) -> EvictionReport {
        let mut report = EvictionReport::default();

        while store.len() > self.max_entries {
            let Some(key) = store.oldest_written() else {
                break;
            };
            store.remove(&key);
            report.by_count += 1;
        }

        if store.total_size() > self.max_memory_bytes {
            let before = store.total_size();
            let target = self.max_memory_bytes / 2;

            for key in store.keys_by_last_access() {
                if store.total_size() <= target {
                    break;
                }
                store.remove(&key);
                report.by_memory += 1;
            }

            warn!(
                before_bytes = before,
                after_bytes = store.total_size(),
                limit_bytes = self.max_memory_bytes,
                evicted = report.by_memory,
                "Cache memory pressure, evicted least recently used entries"
            );
        }

        report
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn put(store: &mut TtlStore, key: &str, value: serde_json::Value) {
        store.insert(CacheEntry::new(key, Arc::new(value), Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_limit_drops_oldest_written() {
        let mut store = TtlStore::new();
        let policy = EvictionPolicy::new(3, usize::MAX);

        for key in ["k1", "k2", "k3", "k4"] {
            put(&mut store, key, json!(1));
        }
        // Reading k1 does not save it: count eviction follows write order
        store.get_fresh("k1", Instant::now());

        let report = policy.enforce(&mut store);

        assert_eq!(report.by_count, 1);
        assert_eq!(store.len(), 3);
        assert!(store.peek("k1").is_none());
        assert!(store.peek("k4").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_under_limits_is_noop() {
        let mut store = TtlStore::new();
        put(&mut store, "a", json!("x"));

        let report = EvictionPolicy::new(10, 1024).enforce(&mut store);
        assert_eq!(report, EvictionReport::default());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_limit_evicts_down_to_half() {
        let mut store = TtlStore::new();
        // Each value serializes to 102 bytes
        let blob = json!("x".repeat(100));

        for key in ["a", "b", "c", "d"] {
            put(&mut store, key, blob.clone());
            tokio::time::advance(Duration::from_millis(1)).await;
        }
        // Touch "a" so it becomes the most recently accessed
        store.get_fresh("a", Instant::now());

        // 408 bytes stored, limit 400 -> must end at or below 200
        let report = EvictionPolicy::new(100, 400).enforce(&mut store);

        assert_eq!(report.by_memory, 3);
        assert!(store.total_size() <= 200);
        assert!(store.peek("a").is_some());
        assert_eq!(report.total(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_entry_limit_empties_store() {
        let mut store = TtlStore::new();
        put(&mut store, "a", json!(1));
        put(&mut store, "b", json!(2));

        let report = EvictionPolicy::new(0, usize::MAX).enforce(&mut store);
        assert_eq!(report.by_count, 2);
        assert!(store.is_empty());
    }
}
