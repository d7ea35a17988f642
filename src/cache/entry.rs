//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

/// Size charged for a value that cannot be serialized.
pub const FALLBACK_ENTRY_SIZE: usize = 1024;

// == Cache Entry ==
/// A cached value plus the metadata used for expiry and eviction.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The key this entry is stored under
    pub key: String,
    /// The stored value
    pub value: Arc<Value>,
    /// When the value was written
    pub written_at: Instant,
    /// How long the value stays fresh after `written_at`
    pub ttl: Duration,
    /// Best-effort size of the serialized value in bytes
    pub estimated_size: usize,
    /// Number of cache hits served by this entry
    pub hit_count: u64,
    /// Last time the entry was written or served
    pub last_access_at: Instant,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry written now.
    pub fn new(key: impl Into<String>, value: Arc<Value>, ttl: Duration) -> Self {
        Self::written_at(key, value, ttl, Instant::now())
    }

    /// Creates a new entry with an explicit write timestamp.
    pub fn written_at(
        key: impl Into<String>,
        value: Arc<Value>,
        ttl: Duration,
        written_at: Instant,
    ) -> Self {
        let estimated_size = estimate_size(&value);
        Self {
            key: key.into(),
            value,
            written_at,
            ttl,
            estimated_size,
            hit_count: 0,
            last_access_at: written_at,
        }
    }

    // == Age ==
    /// Time elapsed since the value was written.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.written_at)
    }

    // == Freshness ==
    /// A value is served only while `now - written_at < ttl`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.age(now) < self.ttl
    }

    /// The sweeper removes an entry once `now - written_at > ttl`.
    ///
    /// Entries sitting exactly on the boundary are already unservable through
    /// [`is_fresh`](Self::is_fresh) and get collected on the next pass.
    pub fn is_sweepable(&self, now: Instant) -> bool {
        self.age(now) > self.ttl
    }

    // == Record Hit ==
    pub fn record_hit(&mut self, now: Instant) {
        self.hit_count += 1;
        self.last_access_at = now;
    }
}

// == Utility Functions ==
/// Estimates the footprint of a value by serializing it and counting bytes.
///
/// This is O(size) and approximate; it is not an accounting guarantee.
pub fn estimate_size(value: &Value) -> usize {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .unwrap_or(FALLBACK_ENTRY_SIZE)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_estimate_size_counts_serialized_bytes() {
        assert_eq!(estimate_size(&json!("abc")), 5);
        assert_eq!(estimate_size(&json!([1, 2, 3])), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_freshness_boundary() {
        let entry = CacheEntry::new("k", Arc::new(json!(1)), Duration::from_millis(100));
        let t0 = entry.written_at;

        assert!(entry.is_fresh(t0 + Duration::from_millis(99)));
        assert!(!entry.is_fresh(t0 + Duration::from_millis(100)));

        // On the boundary: unservable but not yet sweepable
        assert!(!entry.is_sweepable(t0 + Duration::from_millis(100)));
        assert!(entry.is_sweepable(t0 + Duration::from_millis(101)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_hit_updates_access() {
        let mut entry = CacheEntry::new("k", Arc::new(json!({"a": 1})), Duration::from_secs(1));
        assert_eq!(entry.hit_count, 0);

        tokio::time::advance(Duration::from_millis(10)).await;
        let now = Instant::now();
        entry.record_hit(now);

        assert_eq!(entry.hit_count, 1);
        assert_eq!(entry.last_access_at, now);
        assert_eq!(entry.age(now), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_zero_ttl_is_never_fresh() {
        let entry = CacheEntry::new("k", Arc::new(json!(null)), Duration::ZERO);
        assert!(!entry.is_fresh(entry.written_at));
    }
}
