//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - checks the backing store

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler.
///
/// Returns a simple "OK" to indicate the process is running. Does NOT check
/// dependencies - failure means the process is hung.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Checks the backing store to determine if the service can handle traffic.
/// Returns 200 if ready, 503 if not ready. Error messages are generic;
/// actual errors are logged server-side.
#[tracing::instrument(skip_all, name = "roster.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_check = sqlx::query("SELECT 1").fetch_one(&state.pool).await;

    if let Err(e) = db_check {
        tracing::warn!("Readiness check failed: database error: {}", e);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                database: Some("unhealthy"),
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            database: Some("healthy"),
            error: None,
        }),
    )
}
