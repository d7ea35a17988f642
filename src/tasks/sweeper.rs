//! Cache Sweeper Task
//!
//! Periodically removes expired entries, independent of read traffic, so keys
//! nobody asks for again do not sit in memory forever.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::WeakQueryCache;

/// Spawns the sweeper for a cache.
///
/// The task holds only a weak handle and exits on its own once the cache is
/// dropped. Stop it earlier with `JoinHandle::abort` (see
/// [`QueryCache::stop_sweeper`](crate::cache::QueryCache::stop_sweeper)).
///
/// # Example
/// ```ignore
/// let cache = QueryCache::new(CacheConfig::default());
/// let handle = spawn_sweeper(cache.downgrade(), Duration::from_secs(10));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_sweeper(cache: WeakQueryCache, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting cache sweeper");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(cache) = cache.upgrade() else {
                debug!("Cache dropped, sweeper exiting");
                break;
            };

            let removed = cache.sweep().await;
            if removed > 0 {
                info!("Cache sweep: removed {} expired entries", removed);
            } else {
                debug!("Cache sweep: no expired entries found");
            }
        }
    })
}
