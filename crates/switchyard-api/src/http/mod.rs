//! HTTP/REST API layer for Switchyard.
//!
//! Axum-based REST API at `/api/v1/` with an envelope response format and
//! CORS support, for dashboards and remote callers.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
