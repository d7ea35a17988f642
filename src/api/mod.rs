//! API Module
//!
//! HTTP handlers and routing for a terminal node.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Cache statistics
//! - `DELETE /cache/:key` - Invalidate one key
//! - `POST /cache/invalidate` - Invalidate keys matching a regex
//! - `PUT /cache/preload` - Store a value without a producer call
//! - `POST /sync/events` - Inbound mutation events from peer terminals

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
