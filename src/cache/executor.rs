//! Query Cache Module
//!
//! Request coalescing in front of the TTL store. At most one producer call is
//! in flight per key; every concurrent caller for that key shares its result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStats, Counters, EvictionPolicy, TtlResolver, TtlStore};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

type Outcome = std::result::Result<Arc<Value>, CacheError>;

// == Execute Options ==
/// Per-call overrides for [`QueryCache::execute`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// TTL for the value written by this call, instead of the resolved one
    pub ttl: Option<Duration>,
    /// Skip the cache lookup (still joins an in-flight request)
    pub force: bool,
    /// Dedup window for this call, instead of the configured one
    pub dedup_window: Option<Duration>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = Some(window);
        self
    }
}

// == Pending Request ==
/// An outstanding producer call. Exactly one per key at any instant.
#[derive(Debug)]
struct PendingRequest {
    id: u64,
    started_at: Instant,
    result: watch::Receiver<Option<Outcome>>,
}

#[derive(Debug, Default)]
struct CacheState {
    store: TtlStore,
    pending: HashMap<String, PendingRequest>,
    counters: Counters,
    next_request_id: u64,
    closed: bool,
}

#[derive(Debug)]
struct CacheInner {
    state: Mutex<CacheState>,
    resolver: TtlResolver,
    eviction: EvictionPolicy,
    config: CacheConfig,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// What a caller does after inspecting the cache under the lock.
enum Plan {
    Wait(watch::Receiver<Option<Outcome>>),
    Lead {
        id: u64,
        started_at: Instant,
        tx: watch::Sender<Option<Outcome>>,
        rx: watch::Receiver<Option<Outcome>>,
    },
}

// == Query Cache ==
/// Handle to a cache instance. Cloning is cheap and shares the instance.
#[derive(Debug, Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

/// Non-owning handle used by background tasks so they never keep a cache alive.
#[derive(Debug, Clone)]
pub struct WeakQueryCache {
    inner: Weak<CacheInner>,
}

impl WeakQueryCache {
    pub fn upgrade(&self) -> Option<QueryCache> {
        self.inner.upgrade().map(|inner| QueryCache { inner })
    }
}

impl QueryCache {
    // == Constructor ==
    /// Creates a cache with no background sweeper.
    pub fn new(config: CacheConfig) -> Self {
        let resolver = TtlResolver::new(config.ttl_rules.clone(), config.default_ttl);
        let eviction = EvictionPolicy::new(config.max_entries, config.max_memory_bytes);

        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState::default()),
                resolver,
                eviction,
                config,
                sweeper: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Creates a cache and starts its sweeper. Must be called inside a tokio runtime.
    pub fn start(config: CacheConfig) -> Self {
        let cache = Self::new(config);
        cache.start_sweeper();
        cache
    }

    pub fn downgrade(&self) -> WeakQueryCache {
        WeakQueryCache {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// TTL that applies to `key` when no override is given.
    pub fn resolve_ttl(&self, key: &str) -> Duration {
        self.inner.resolver.resolve(key)
    }

    // == Execute ==
    /// Returns the cached value for `key`, or runs `producer` to obtain it.
    ///
    /// Concurrent calls for the same key share one producer call and all
    /// receive its result, success or failure. Failures are never cached.
    /// There is no built-in timeout; that belongs to the producer.
    pub async fn execute<F, Fut>(
        &self,
        key: &str,
        producer: F,
        options: ExecuteOptions,
    ) -> Result<Arc<Value>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let plan = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(CacheError::Closed);
            }
            let now = Instant::now();

            if !options.force {
                if let Some(value) = state.store.get_fresh(key, now) {
                    state.counters.record_hit();
                    debug!(key, "Cache hit");
                    return Ok(value);
                }
            }

            let in_flight = state.pending.get(key).map(|p| p.result.clone());
            if let Some(rx) = in_flight {
                state.counters.record_coalesced();
                debug!(key, "Joined in-flight request");
                Plan::Wait(rx)
            } else {
                state.counters.record_miss();
                let id = state.next_request_id;
                state.next_request_id += 1;

                let (tx, rx) = watch::channel(None);
                state.pending.insert(
                    key.to_string(),
                    PendingRequest {
                        id,
                        started_at: now,
                        result: rx.clone(),
                    },
                );
                Plan::Lead {
                    id,
                    started_at: now,
                    tx,
                    rx,
                }
            }
        };

        let mut rx = match plan {
            Plan::Wait(rx) => rx,
            Plan::Lead {
                id,
                started_at,
                tx,
                rx,
            } => {
                debug!(key, "Cache miss, starting producer");
                let ttl = options
                    .ttl
                    .unwrap_or_else(|| self.inner.resolver.resolve(key));
                let window = options
                    .dedup_window
                    .unwrap_or(self.inner.config.dedup_window);
                let request = SettleRequest {
                    key: key.to_string(),
                    id,
                    started_at,
                    ttl,
                    window,
                };
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    // producer() runs inside the task so a panic there settles too
                    let outcome = match tokio::spawn(async move { producer().await }).await {
                        Ok(Ok(value)) => Ok(Arc::new(value)),
                        Ok(Err(err)) => Err(CacheError::producer(err)),
                        Err(join_err) => Err(CacheError::Internal(format!(
                            "producer task failed: {}",
                            join_err
                        ))),
                    };
                    inner.settle(request, outcome, tx).await;
                });
                rx
            }
        };

        wait_for_outcome(&mut rx).await
    }

    /// Like [`execute`](Self::execute), decoding the cached JSON into `T`.
    pub async fn execute_as<T, F, Fut>(
        &self,
        key: &str,
        producer: F,
        options: ExecuteOptions,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let value = self.execute(key, producer, options).await?;
        T::deserialize(value.as_ref()).map_err(|e| CacheError::Decode(format!("{}: {}", key, e)))
    }

    // == Invalidate ==
    /// Drops the entry for `key`. Returns whether an entry was removed.
    ///
    /// An in-flight request for the key is detached, not cancelled: its current
    /// waiters still get the result, but the result is not written back.
    pub async fn invalidate(&self, key: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        let removed = state.store.remove(key).is_some();
        if state.pending.remove(key).is_some() {
            debug!(key, "Detached in-flight request on invalidation");
        }
        removed
    }

    /// Drops every entry whose key matches the regular expression `pattern`.
    /// Returns the number of entries removed.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let re = Regex::new(pattern).map_err(|e| CacheError::InvalidPattern(e.to_string()))?;

        let mut state = self.inner.state.lock().await;
        let removed = state.store.remove_matching(|key| re.is_match(key)).len();
        state.pending.retain(|key, _| !re.is_match(key));

        debug!(pattern, removed, "Invalidated by pattern");
        Ok(removed)
    }

    // == Preload ==
    /// Writes a value directly, as if a producer had just returned it.
    pub async fn preload(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let ttl = ttl.unwrap_or_else(|| self.inner.resolver.resolve(key));

        let mut state = self.inner.state.lock().await;
        if state.closed {
            return Err(CacheError::Closed);
        }
        state.store.insert(CacheEntry::new(key, Arc::new(value), ttl));
        let report = self.inner.eviction.enforce(&mut state.store);
        state.counters.record_evictions(report.total());
        Ok(())
    }

    // == Stats ==
    pub async fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock().await;
        let now = Instant::now();

        CacheStats {
            entry_count: state.store.len(),
            pending_count: state.pending.len(),
            estimated_memory_bytes: state.store.total_size(),
            per_key_age_ms: state
                .store
                .iter()
                .map(|entry| (entry.key.clone(), entry.age(now).as_millis() as u64))
                .collect(),
            ..CacheStats::default()
        }
        .with_counters(state.counters)
    }

    // == Sweep ==
    /// Removes expired entries and re-applies the eviction limits.
    /// Returns the number of expired entries removed.
    pub async fn sweep(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        let expired = state.store.remove_expired(Instant::now());
        state.counters.record_expired(expired);

        let report = self.inner.eviction.enforce(&mut state.store);
        state.counters.record_evictions(report.total());
        expired
    }

    // == Lifecycle ==
    /// Starts the background sweeper, replacing any running one.
    pub fn start_sweeper(&self) {
        let handle = crate::tasks::spawn_sweeper(self.downgrade(), self.inner.config.sweep_interval);
        let previous = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stops the background sweeper. Safe to call any number of times.
    pub fn stop_sweeper(&self) {
        let handle = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("Cache sweeper stopped");
        }
    }

    /// Stops the sweeper and drops all entries. Later calls to `execute` and
    /// `preload` fail with [`CacheError::Closed`]. Idempotent.
    pub async fn close(&self) {
        self.stop_sweeper();

        let mut state = self.inner.state.lock().await;
        if !state.closed {
            state.closed = true;
            state.store.clear();
            state.pending.clear();
            info!("Query cache closed");
        }
    }
}

/// Everything needed to settle one producer call.
struct SettleRequest {
    key: String,
    id: u64,
    started_at: Instant,
    ttl: Duration,
    window: Duration,
}

impl CacheInner {
    // == Settle ==
    /// Records a producer outcome and releases every waiter.
    ///
    /// A successful value is written only if the request is still the
    /// registered one for its key and nothing newer was written meanwhile.
    async fn settle(
        self: Arc<Self>,
        request: SettleRequest,
        outcome: Outcome,
        tx: watch::Sender<Option<Outcome>>,
    ) {
        let SettleRequest {
            key,
            id,
            started_at,
            ttl,
            window,
        } = request;

        let keep_window = {
            let mut state = self.state.lock().await;
            let registered = state.pending.get(&key).map(|p| p.id) == Some(id);

            let keep_window = match &outcome {
                Ok(value) => {
                    let superseded = state
                        .store
                        .peek(&key)
                        .is_some_and(|entry| entry.written_at > started_at);

                    if registered && !superseded && !state.closed {
                        state
                            .store
                            .insert(CacheEntry::new(key.clone(), Arc::clone(value), ttl));
                        let report = self.eviction.enforce(&mut state.store);
                        state.counters.record_evictions(report.total());
                    } else {
                        debug!(key = %key, "Discarding result overtaken by invalidation or newer write");
                    }
                    registered && !window.is_zero()
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "Producer failed");
                    false
                }
            };

            if registered && !keep_window {
                state.pending.remove(&key);
            }
            tx.send_replace(Some(outcome));
            keep_window
        };

        if keep_window {
            tokio::time::sleep(window).await;
            let mut state = self.state.lock().await;
            if state.pending.get(&key).map(|p| p.id) == Some(id) {
                state.pending.remove(&key);
            }
        }
    }
}

async fn wait_for_outcome(rx: &mut watch::Receiver<Option<Outcome>>) -> Result<Arc<Value>> {
    let settled = rx
        .wait_for(Option::is_some)
        .await
        .map_err(|_| CacheError::Internal("in-flight request dropped before settling".into()))?;

    match &*settled {
        Some(outcome) => outcome.clone(),
        None => Err(CacheError::Internal("in-flight request settled empty".into())),
    }
}
