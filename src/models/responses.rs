//! Response DTOs for the node's HTTP surface
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Terminal identity
    pub node_id: String,
    #[serde(flatten)]
    pub cache: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    pub fn new(node_id: impl Into<String>, cache: CacheStats) -> Self {
        let hit_rate = cache.hit_rate();
        Self {
            node_id: node_id.into(),
            cache,
            hit_rate,
        }
    }
}

/// Response body for DELETE /cache/:key and POST /cache/invalidate
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Key or pattern that was invalidated
    pub target: String,
    /// Number of entries removed
    pub removed: usize,
}

impl InvalidateResponse {
    pub fn new(target: impl Into<String>, removed: usize) -> Self {
        Self {
            target: target.into(),
            removed,
        }
    }
}

/// Response body for PUT /cache/preload
#[derive(Debug, Clone, Serialize)]
pub struct PreloadResponse {
    /// Success message
    pub message: String,
    /// The key that was preloaded
    pub key: String,
    /// TTL applied to the entry, in milliseconds
    pub ttl_ms: u64,
}

impl PreloadResponse {
    pub fn new(key: impl Into<String>, ttl_ms: u64) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' preloaded", key),
            key,
            ttl_ms,
        }
    }
}

/// Response body for POST /sync/events
#[derive(Debug, Clone, Serialize)]
pub struct PublishResponse {
    pub topic: String,
    /// Handlers on this node that accepted the event
    pub delivered: usize,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Terminal identity
    pub node_id: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(node_id: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            node_id: node_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_response_flattens_cache_stats() {
        let cache = CacheStats {
            entry_count: 3,
            hits: 8,
            misses: 2,
            ..CacheStats::default()
        };
        let resp = StatsResponse::new("cashier-1", cache);
        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["node_id"], "cashier-1");
        assert_eq!(json["entry_count"], 3);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_preload_response_serialize() {
        let resp = PreloadResponse::new("products", 5000);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("products"));
        assert!(json.contains("5000"));
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy("kiosk-2");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("kiosk-2"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_invalidate_response_serialize() {
        let resp = InvalidateResponse::new("^orders", 2);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["removed"], 2);
    }
}
