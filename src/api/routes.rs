//! API Routes
//!
//! Configures the Axum router with all node endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health_handler, invalidate_handler, invalidate_pattern_handler, preload_handler,
    publish_handler, stats_handler, AppState,
};
use crate::sync::EVENTS_PATH;

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (terminals run on the store LAN)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/cache/invalidate", post(invalidate_pattern_handler))
        .route("/cache/preload", put(preload_handler))
        .route("/cache/:key", delete(invalidate_handler))
        .route(EVENTS_PATH, post(publish_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
