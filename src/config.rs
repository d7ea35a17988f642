//! Configuration Module
//!
//! Handles loading node and cache configuration from environment variables.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::cache::TtlRule;

/// Default ordered TTL rules, coarse data classes from fastest to slowest changing.
pub const DEFAULT_TTL_RULES: &str =
    "orders=1000,tables=2000,products=5000,categories=10000,config=30000";

/// Node configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of cache entries
    pub max_entries: usize,
    /// Soft limit on the estimated size of all cached values, in bytes
    pub max_memory_bytes: usize,
    /// TTL for keys that match no rule
    pub default_ttl: Duration,
    /// Ordered key-pattern TTL rules; first match wins
    pub ttl_rules: Vec<TtlRule>,
    /// Grace period during which a settled request still absorbs duplicate callers
    pub dedup_window: Duration,
    /// Background sweeper interval
    pub sweep_interval: Duration,
    /// HTTP server port
    pub server_port: u16,
    /// Identity stamped on events published by this terminal
    pub node_id: String,
    /// Base URLs of peer terminals that receive this node's mutation events
    pub peers: Vec<String>,
}

/// Settings injected into a [`crate::cache::QueryCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_memory_bytes: usize,
    pub default_ttl: Duration,
    pub ttl_rules: Vec<TtlRule>,
    pub dedup_window: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Config::default().cache_config()
    }
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 200)
    /// - `CACHE_MAX_MEMORY_BYTES` - Soft memory limit (default: 50 MiB)
    /// - `CACHE_DEFAULT_TTL_MS` - Fallback TTL in milliseconds (default: 5000)
    /// - `CACHE_TTL_RULES` - Ordered `pattern=millis` list (default: [`DEFAULT_TTL_RULES`])
    /// - `CACHE_DEDUP_WINDOW_MS` - Dedup window in milliseconds (default: 50)
    /// - `CACHE_SWEEP_INTERVAL_MS` - Sweeper interval in milliseconds (default: 10000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `NODE_ID` - Terminal identity (default: `terminal-<port>`)
    /// - `SYNC_PEERS` - Comma-separated peer base URLs (default: none)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let server_port = env_parse("SERVER_PORT").unwrap_or(defaults.server_port);

        Self {
            max_entries: env_parse("CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            max_memory_bytes: env_parse("CACHE_MAX_MEMORY_BYTES")
                .unwrap_or(defaults.max_memory_bytes),
            default_ttl: env_parse("CACHE_DEFAULT_TTL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_ttl),
            ttl_rules: env::var("CACHE_TTL_RULES")
                .map(|raw| parse_ttl_rules(&raw))
                .unwrap_or(defaults.ttl_rules),
            dedup_window: env_parse("CACHE_DEDUP_WINDOW_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.dedup_window),
            sweep_interval: env_parse("CACHE_SWEEP_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.sweep_interval),
            server_port,
            node_id: env::var("NODE_ID").unwrap_or_else(|_| format!("terminal-{}", server_port)),
            peers: env::var("SYNC_PEERS")
                .map(|raw| parse_peers(&raw))
                .unwrap_or_default(),
        }
    }

    /// Extracts the settings the cache is constructed with.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.max_entries,
            max_memory_bytes: self.max_memory_bytes,
            default_ttl: self.default_ttl,
            ttl_rules: self.ttl_rules.clone(),
            dedup_window: self.dedup_window,
            sweep_interval: self.sweep_interval,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 200,
            max_memory_bytes: 50 * 1024 * 1024,
            default_ttl: Duration::from_secs(5),
            ttl_rules: parse_ttl_rules(DEFAULT_TTL_RULES),
            dedup_window: Duration::from_millis(50),
            sweep_interval: Duration::from_secs(10),
            server_port: 3000,
            node_id: "terminal-3000".to_string(),
            peers: Vec::new(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Parses an ordered `pattern=millis,pattern=millis` list.
///
/// Malformed items are skipped with a warning; order is preserved.
pub fn parse_ttl_rules(raw: &str) -> Vec<TtlRule> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| {
            let parsed = item.split_once('=').and_then(|(pattern, millis)| {
                let pattern = pattern.trim();
                let millis: u64 = millis.trim().parse().ok()?;
                (!pattern.is_empty()).then(|| TtlRule::new(pattern, Duration::from_millis(millis)))
            });
            if parsed.is_none() {
                warn!(item, "Ignoring malformed TTL rule");
            }
            parsed
        })
        .collect()
}

fn parse_peers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|peer| peer.trim().trim_end_matches('/'))
        .filter(|peer| !peer.is_empty())
        .map(str::to_string)
        .collect()
}
