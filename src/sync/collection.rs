//! Tracked Collections
//!
//! The live working set of one entity type (tables, orders, ...). Seeded from
//! the query cache once, then kept current by local actions and by mutation
//! events from other terminals. All merges are keyed by record id and are
//! idempotent, so redelivered or reordered events cannot duplicate records.
//!
//! Conflict policy is last event wins: an inbound event replaces the local
//! record even if it carries an optimistic edit the backend has not yet
//! acknowledged.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::{ExecuteOptions, QueryCache};
use crate::error::Result;

// == Record ==
/// A row of a tracked collection, identified by a string id.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
}

// == Merge Outcome ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The id was absent and the record was appended
    Inserted,
    /// The id was present and the record replaced it
    Replaced,
    /// A remote event replaced a record with an unacknowledged local edit
    OverrodeLocal,
}

#[derive(Debug)]
struct CollectionState<R> {
    items: Vec<R>,
    /// Ids edited locally and not yet acknowledged by the backend
    unacknowledged: HashSet<String>,
    /// Ids deleted before the initial load completed; the snapshot must not revive them
    tombstones: HashSet<String>,
    loaded: bool,
}

impl<R: Record> CollectionState<R> {
    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    fn upsert(&mut self, record: R) -> MergeOutcome {
        self.tombstones.remove(record.id());
        match self.position(record.id()) {
            Some(pos) => {
                self.items[pos] = record;
                MergeOutcome::Replaced
            }
            None => {
                self.items.push(record);
                MergeOutcome::Inserted
            }
        }
    }

    fn delete(&mut self, id: &str) -> Option<R> {
        self.unacknowledged.remove(id);
        if !self.loaded {
            self.tombstones.insert(id.to_string());
        }
        let pos = self.position(id)?;
        Some(self.items.remove(pos))
    }

    fn merge_remote(&mut self, record: R) -> MergeOutcome {
        let overrode = self.unacknowledged.remove(record.id());
        match (self.upsert(record), overrode) {
            (MergeOutcome::Replaced, true) => MergeOutcome::OverrodeLocal,
            (outcome, _) => outcome,
        }
    }
}

// == Tracked Collection ==
/// Shared handle to one entity type's records. Cloning shares the collection.
///
/// Every mutation, local or remote, takes the same write lock, so a local
/// optimistic write and a remote event never interleave mid-merge.
#[derive(Debug)]
pub struct TrackedCollection<R> {
    state: Arc<RwLock<CollectionState<R>>>,
}

impl<R> Clone for TrackedCollection<R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<R: Record> Default for TrackedCollection<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> TrackedCollection<R> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(CollectionState {
                items: Vec::new(),
                unacknowledged: HashSet::new(),
                tombstones: HashSet::new(),
                loaded: false,
            })),
        }
    }

    // == Seeding ==
    /// Loads the collection through the cache, once.
    ///
    /// Later calls return the current length without fetching. Records that
    /// arrived through events while the load was in flight are newer than the
    /// snapshot and are kept; ids deleted in that time stay deleted. The
    /// snapshot fills in the rest.
    pub async fn seed<F, Fut>(
        &self,
        cache: &QueryCache,
        key: &str,
        producer: F,
        options: ExecuteOptions,
    ) -> Result<usize>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        if self.state.read().await.loaded {
            return Ok(self.len().await);
        }

        let records: Vec<R> = cache.execute_as(key, producer, options).await?;

        let mut state = self.state.write().await;
        if !state.loaded {
            for record in records {
                let id = record.id();
                if state.position(id).is_none() && !state.tombstones.contains(id) {
                    state.items.push(record);
                }
            }
            state.tombstones.clear();
            state.loaded = true;
            info!(key, items = state.items.len(), "Tracked collection seeded");
        }
        Ok(state.items.len())
    }

    // == Remote Merges ==
    /// Create event: replace if present, append otherwise.
    pub async fn apply_create(&self, record: R) -> MergeOutcome {
        self.state.write().await.merge_remote(record)
    }

    /// Update event: replace if present, insert otherwise (tolerates a missed create).
    pub async fn apply_update(&self, record: R) -> MergeOutcome {
        self.state.write().await.merge_remote(record)
    }

    /// Status change event: a full-record replace, never a partial patch.
    pub async fn apply_status_changed(&self, record: R) -> MergeOutcome {
        self.state.write().await.merge_remote(record)
    }

    /// Delete event: remove if present. Returns whether anything was removed.
    pub async fn apply_delete(&self, id: &str) -> bool {
        self.state.write().await.delete(id).is_some()
    }

    // == Local Actions ==
    /// Optimistic local write; marked unacknowledged until [`acknowledge`](Self::acknowledge).
    pub async fn upsert(&self, record: R) -> MergeOutcome {
        let mut state = self.state.write().await;
        state.unacknowledged.insert(record.id().to_string());
        state.upsert(record)
    }

    /// Optimistic local delete.
    pub async fn remove(&self, id: &str) -> Option<R> {
        self.state.write().await.delete(id)
    }

    /// The backend confirmed the local edit for `id`.
    pub async fn acknowledge(&self, id: &str) {
        if self.state.write().await.unacknowledged.remove(id) {
            debug!(id, "Local edit acknowledged");
        }
    }

    // == Accessors ==
    pub async fn get(&self, id: &str) -> Option<R> {
        let state = self.state.read().await;
        state.position(id).map(|pos| state.items[pos].clone())
    }

    pub async fn snapshot(&self) -> Vec<R> {
        self.state.read().await.items.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.items.is_empty()
    }

    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.loaded
    }

    pub async fn is_unacknowledged(&self, id: &str) -> bool {
        self.state.read().await.unacknowledged.contains(id)
    }
}
