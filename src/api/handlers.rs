//! API Handlers
//!
//! HTTP request handlers for each node endpoint.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::debug;

use crate::cache::QueryCache;
use crate::config::Config;
use crate::error::{CacheError, Result, SyncError};
use crate::models::{
    HealthResponse, InvalidatePatternRequest, InvalidateResponse, PreloadRequest, PreloadResponse,
    PublishResponse, StatsResponse,
};
use crate::sync::{MutationEvent, SyncBus, Topic};

/// Application state shared across all handlers.
///
/// Both handles are cheap clones over shared instances.
#[derive(Clone)]
pub struct AppState {
    pub cache: QueryCache,
    pub bus: SyncBus,
}

impl AppState {
    pub fn new(cache: QueryCache, bus: SyncBus) -> Self {
        Self { cache, bus }
    }

    /// Builds a cache (with its sweeper running) and a bus from configuration.
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            QueryCache::start(config.cache_config()),
            SyncBus::new(config.node_id.clone()),
        )
    }
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.bus.node_id()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.stats().await;
    Json(StatsResponse::new(state.bus.node_id(), stats))
}

/// Handler for DELETE /cache/:key
///
/// Invalidating an absent key is not an error; `removed` is 0.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<InvalidateResponse> {
    let removed = state.cache.invalidate(&key).await;
    Json(InvalidateResponse::new(key, usize::from(removed)))
}

/// Handler for POST /cache/invalidate
pub async fn invalidate_pattern_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidatePatternRequest>,
) -> Result<Json<InvalidateResponse>> {
    let removed = state.cache.invalidate_pattern(&req.pattern).await?;
    Ok(Json(InvalidateResponse::new(req.pattern, removed)))
}

/// Handler for PUT /cache/preload
pub async fn preload_handler(
    State(state): State<AppState>,
    Json(req): Json<PreloadRequest>,
) -> Result<Json<PreloadResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req
        .ttl_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| state.cache.resolve_ttl(&req.key));
    state.cache.preload(&req.key, req.value, Some(ttl)).await?;

    Ok(Json(PreloadResponse::new(req.key, ttl.as_millis() as u64)))
}

/// Handler for POST /sync/events
///
/// Entry point for events published on another terminal. The origin is kept
/// so the relay does not forward the event again.
pub async fn publish_handler(
    State(state): State<AppState>,
    Json(event): Json<MutationEvent>,
) -> std::result::Result<Json<PublishResponse>, SyncError> {
    Topic::parse(&event.topic)?;

    let topic = event.topic.clone();
    debug!(topic = %topic, origin = ?event.origin, "Inbound sync event");
    let delivered = state.bus.deliver(event);

    Ok(Json(PublishResponse { topic, delivered }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use serde_json::json;

    fn test_state() -> AppState {
        AppState::new(QueryCache::new(CacheConfig::default()), SyncBus::new("test-node"))
    }

    #[tokio::test]
    async fn test_preload_then_stats() {
        let state = test_state();

        let req = PreloadRequest {
            key: "products".to_string(),
            value: json!([1, 2, 3]),
            ttl_ms: None,
        };
        let resp = preload_handler(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(resp.ttl_ms, 5000);

        let stats = stats_handler(State(state)).await;
        assert_eq!(stats.cache.entry_count, 1);
        assert_eq!(stats.node_id, "test-node");
    }

    #[tokio::test]
    async fn test_preload_invalid_request() {
        let state = test_state();
        let req = PreloadRequest {
            key: "".to_string(),
            value: json!(1),
            ttl_ms: None,
        };
        let result = preload_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_invalidate_handler() {
        let state = test_state();
        state.cache.preload("orders-open", json!([]), None).await.unwrap();

        let resp = invalidate_handler(State(state.clone()), Path("orders-open".into())).await;
        assert_eq!(resp.removed, 1);

        let resp = invalidate_handler(State(state), Path("orders-open".into())).await;
        assert_eq!(resp.removed, 0);
    }

    #[tokio::test]
    async fn test_invalidate_pattern_handler_rejects_bad_regex() {
        let state = test_state();
        let req = InvalidatePatternRequest {
            pattern: "[".into(),
        };
        let result = invalidate_pattern_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(CacheError::InvalidPattern(_))));
    }

    #[tokio::test]
    async fn test_publish_handler_delivers_to_bus() {
        let state = test_state();
        let _sub = state.bus.subscribe("sync:table:delete", |_| Ok(()));

        let event = MutationEvent {
            topic: "sync:table:delete".into(),
            payload: json!({"id": "table-1"}),
            origin: Some("waiter-2".into()),
        };
        let resp = publish_handler(State(state), Json(event)).await.unwrap();
        assert_eq!(resp.delivered, 1);
    }

    #[tokio::test]
    async fn test_publish_handler_rejects_bad_topic() {
        let state = test_state();
        let event = MutationEvent {
            topic: "tables/update".into(),
            payload: json!({}),
            origin: None,
        };
        let result = publish_handler(State(state), Json(event)).await;
        assert!(matches!(result, Err(SyncError::InvalidTopic(_))));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler(State(test_state())).await;
        assert_eq!(response.status, "healthy");
    }
}
