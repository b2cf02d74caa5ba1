//! Middleware for the roster service.
//!
//! - `auth` - Bearer token verification for protected routes
//! - `http_metrics` - Request/response metrics for all routes

pub mod auth;
pub mod http_metrics;

pub use auth::{require_auth, AuthState};
pub use http_metrics::http_metrics_middleware;
