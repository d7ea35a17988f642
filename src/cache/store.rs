//! TTL Store Module
//!
//! Keyed storage of cache entries with write-order tracking and a running
//! size estimate. Pure data structure: no I/O, no locking, no clock of its own.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;

use crate::cache::{CacheEntry, InsertionOrder};

// == TTL Store ==
#[derive(Debug, Default)]
pub struct TtlStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Write order, oldest first
    order: InsertionOrder,
    /// Sum of `estimated_size` over all entries
    total_size: usize,
}

impl TtlStore {
    pub fn new() -> Self {
        Self::default()
    }

    // == Get Fresh ==
    /// Returns the value for `key` if it is still fresh at `now`.
    ///
    /// A hit bumps the entry's hit count and access time. A stale entry is
    /// removed on the spot so it is never served, whatever the sweeper cadence.
    pub fn get_fresh(&mut self, key: &str, now: Instant) -> Option<Arc<Value>> {
        let entry = self.entries.get_mut(key)?;
        if entry.is_fresh(now) {
            entry.record_hit(now);
            return Some(Arc::clone(&entry.value));
        }
        self.remove(key);
        None
    }

    // == Peek ==
    /// Returns the entry without touching access metadata.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Insert ==
    /// Stores an entry, replacing any previous value for the key.
    pub fn insert(&mut self, entry: CacheEntry) {
        let key = entry.key.clone();
        self.total_size += entry.estimated_size;
        if let Some(previous) = self.entries.insert(key.clone(), entry) {
            self.total_size -= previous.estimated_size;
        }
        self.order.record_write(&key);
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(key);
        self.total_size -= entry.estimated_size;
        Some(entry)
    }

    // == Remove Matching ==
    /// Removes every entry whose key satisfies `predicate`. Returns the removed keys.
    pub fn remove_matching<F>(&mut self, mut predicate: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();

        for key in &keys {
            self.remove(key);
        }
        keys
    }

    // == Remove Expired ==
    /// Removes every entry whose age exceeds its TTL. Returns the number removed.
    pub fn remove_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_sweepable(now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    // == Eviction Candidates ==
    /// The key written longest ago.
    pub fn oldest_written(&self) -> Option<String> {
        self.order.oldest().cloned()
    }

    /// Keys ordered from least to most recently accessed.
    pub fn keys_by_last_access(&self) -> Vec<String> {
        let mut entries: Vec<&CacheEntry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.last_access_at);
        entries.into_iter().map(|entry| entry.key.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Estimated bytes held by all entries.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.total_size = 0;
    }
}
