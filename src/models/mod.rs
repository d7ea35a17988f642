//! Request and Response models for the node's HTTP surface
//!
//! This module defines the DTOs used for serializing/deserializing HTTP
//! request and response bodies. Inbound sync events use
//! [`crate::sync::MutationEvent`] directly.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{InvalidatePatternRequest, PreloadRequest};
pub use responses::{
    HealthResponse, InvalidateResponse, PreloadResponse, PublishResponse, StatsResponse,
};
