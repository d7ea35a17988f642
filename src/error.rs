//! Error types for the cache and sync layers
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Error type returned by the query cache.
///
/// Cloneable so that a single producer failure can be handed to every caller
/// waiting on the same in-flight request.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The upstream producer failed; never cached
    #[error("Producer failed: {0}")]
    Producer(Arc<anyhow::Error>),

    /// Invalidation pattern is not a valid regular expression
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Cached value could not be decoded into the requested type
    #[error("Decode failed: {0}")]
    Decode(String),

    /// The cache has been closed
    #[error("Cache is closed")]
    Closed,

    /// Internal error (producer task panicked, waiter channel dropped)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Wraps a producer error so it can be shared between waiters.
    pub fn producer(err: anyhow::Error) -> Self {
        CacheError::Producer(Arc::new(err))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidPattern(_) | CacheError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::Producer(_) => StatusCode::BAD_GATEWAY,
            CacheError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Decode(_) | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Sync Error Enum ==
/// Error type for the mutation sync bus and its transports.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// Event payload did not match the expected record shape
    #[error("Malformed payload on {topic}: {reason}")]
    MalformedPayload { topic: String, reason: String },

    /// Topic is not of the form `sync:<entity>:<action>`
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// The collection binding for this entity has been torn down
    #[error("Sync binding for {0} is closed")]
    Unbound(String),

    /// Forwarding to a peer node failed
    #[error("Relay failed: {0}")]
    Relay(String),
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = match &self {
            SyncError::MalformedPayload { .. } | SyncError::InvalidTopic(_) => {
                StatusCode::BAD_REQUEST
            }
            SyncError::Unbound(_) => StatusCode::SERVICE_UNAVAILABLE,
            SyncError::Relay(_) => StatusCode::BAD_GATEWAY,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
