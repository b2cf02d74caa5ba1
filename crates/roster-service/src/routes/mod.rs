//! HTTP routes for the roster service.
//!
//! Defines the Axum router and application state.

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use crate::observability::BackfillTrail;
use crate::repositories::CandidateSource;
use crate::services::TimelinePublisher;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: PgPool,

    /// Service configuration.
    pub config: Config,

    /// Candidate pool behind its trait seam (mockable in tests).
    pub candidates: Arc<dyn CandidateSource>,

    /// Timeline publisher (persistence + fan-out dispatch).
    pub timeline: TimelinePublisher,

    /// Bounded audit trail of backfill passes.
    pub backfill_trail: Arc<BackfillTrail>,
}

/// Build the application routes.
///
/// - `/health` - liveness probe (public, unversioned)
/// - `/ready` - readiness probe (public, unversioned)
/// - `/metrics` - Prometheus metrics endpoint (public, unversioned)
/// - `/api/v1/stage-room-match` - commit a staged roster (authenticated)
/// - `/api/v1/ready-timeout` - standin backfill (authenticated)
/// - `/api/v1/session-meta` - session meta upsert (authenticated)
/// - `/api/v1/matchmake` - role/score assignment (authenticated)
/// - TraceLayer for request logging, 30s request timeout, HTTP metrics
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let verifier = Arc::new(TokenVerifier::new(
        &state.config.jwt_secret,
        state.config.jwt_clock_skew_seconds,
    ));
    let auth_state = Arc::new(AuthState { verifier });

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route(
            "/api/v1/stage-room-match",
            post(handlers::stage_room_match),
        )
        .route("/api/v1/ready-timeout", post(handlers::ready_timeout))
        .route("/api/v1/session-meta", post(handlers::session_meta))
        .route("/api/v1/matchmake", post(handlers::matchmake))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_auth,
        ))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - timeout the request (innermost)
    // 2. TraceLayer - log request details
    // 3. http_metrics_middleware - record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        // AppState must implement Clone for Axum's State extractor.
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_config_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<Config>();
    }
}
