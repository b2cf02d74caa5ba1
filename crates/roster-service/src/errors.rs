//! Roster service error types.
//!
//! All errors map to an HTTP status and a machine-readable snake_case code
//! via the `IntoResponse` impl, so callers can react deterministically
//! (e.g. refetch and retry on `slot_version_conflict`). Database errors are
//! logged server-side and returned with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Roster service error type.
///
/// Maps to HTTP status codes:
/// - InvalidToken: 401 Unauthorized (`unauthorized`)
/// - Forbidden: 403 Forbidden (`forbidden`)
/// - RoomNotFound / SessionNotFound / RosterNotFound: 404
/// - MissingField / validation variants: 400
/// - SlotVersionConflict: 409
/// - MissingStoreFunction and the remaining dependency failures: 500
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Room not found")]
    RoomNotFound,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Roster not found")]
    RosterNotFound,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Roster must not be empty")]
    EmptyRoster,

    #[error("Roles and slots are inconsistent: {0}")]
    RolesSlotsInvalid(String),

    #[error("Declared game does not match the session's game")]
    SessionGameMismatch,

    #[error("Room readiness assertion failed")]
    RoomNotReady,

    #[error("Roster version {incoming} is older than stored version {stored}")]
    SlotVersionConflict { incoming: i64, stored: i64 },

    #[error("Backing store function `{0}` is not installed")]
    MissingStoreFunction(&'static str),

    #[error("Session id unavailable after ensure call")]
    SessionIdUnavailable,

    #[error("Store call failed: {0}")]
    RpcFailed(String),

    #[error("Roster commit failed: {0}")]
    SyncFailed(String),

    #[error("Session meta upsert failed: {0}")]
    UpsertFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RosterError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RosterError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            RosterError::Forbidden(_) => StatusCode::FORBIDDEN,
            RosterError::RoomNotFound
            | RosterError::SessionNotFound
            | RosterError::RosterNotFound => StatusCode::NOT_FOUND,
            RosterError::MissingField(_)
            | RosterError::InvalidPayload(_)
            | RosterError::EmptyRoster
            | RosterError::RolesSlotsInvalid(_)
            | RosterError::SessionGameMismatch
            | RosterError::RoomNotReady => StatusCode::BAD_REQUEST,
            RosterError::SlotVersionConflict { .. } => StatusCode::CONFLICT,
            RosterError::Database(_)
            | RosterError::MissingStoreFunction(_)
            | RosterError::SessionIdUnavailable
            | RosterError::RpcFailed(_)
            | RosterError::SyncFailed(_)
            | RosterError::UpsertFailed(_)
            | RosterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the machine-readable error code for this error.
    pub fn code(&self) -> String {
        match self {
            RosterError::Database(_) => "database_error".to_string(),
            RosterError::InvalidToken(_) => "unauthorized".to_string(),
            RosterError::Forbidden(_) => "forbidden".to_string(),
            RosterError::RoomNotFound => "room_not_found".to_string(),
            RosterError::SessionNotFound => "session_not_found".to_string(),
            RosterError::RosterNotFound => "roster_not_found".to_string(),
            RosterError::MissingField(field) => format!("missing_{field}"),
            RosterError::InvalidPayload(_) => "invalid_payload".to_string(),
            RosterError::EmptyRoster => "empty_roster".to_string(),
            RosterError::RolesSlotsInvalid(_) => "roles_slots_invalid".to_string(),
            RosterError::SessionGameMismatch => "session_game_mismatch".to_string(),
            RosterError::RoomNotReady => "room_not_ready".to_string(),
            RosterError::SlotVersionConflict { .. } => "slot_version_conflict".to_string(),
            RosterError::MissingStoreFunction(name) => format!("missing_{name}"),
            RosterError::SessionIdUnavailable => "session_id_unavailable".to_string(),
            RosterError::RpcFailed(_) => "rpc_failed".to_string(),
            RosterError::SyncFailed(_) => "sync_failed".to_string(),
            RosterError::UpsertFailed(_) => "upsert_failed".to_string(),
            RosterError::Internal(_) => "internal_error".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for RosterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let message = match &self {
            RosterError::Database(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "roster.database", error = %err, "Database operation failed");
                "An internal database error occurred".to_string()
            }
            RosterError::MissingStoreFunction(name) => {
                // Deployment misconfiguration: surface an operator-facing hint
                tracing::error!(
                    target: "roster.store",
                    function = name,
                    "Backing store function is missing; apply the store migrations for this release"
                );
                format!("Backing store function `{name}` is not installed")
            }
            RosterError::RpcFailed(err)
            | RosterError::SyncFailed(err)
            | RosterError::UpsertFailed(err)
            | RosterError::Internal(err) => {
                tracing::error!(target: "roster.store", error = %err, code = %code, "Store operation failed");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail { code, message },
        };

        let mut response = (status, Json(error_response)).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) =
                "Bearer realm=\"rally-lobby-api\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

/// Convert sqlx errors to RosterError
impl From<sqlx::Error> for RosterError {
    fn from(err: sqlx::Error) -> Self {
        RosterError::Database(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RosterError::InvalidToken("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            RosterError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            RosterError::RoomNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RosterError::EmptyRoster.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RosterError::SlotVersionConflict {
                incoming: 99,
                stored: 100
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            RosterError::MissingStoreFunction("sync_match_roster").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_missing_field_code() {
        assert_eq!(
            RosterError::MissingField("match_instance_id").code(),
            "missing_match_instance_id"
        );
        assert_eq!(RosterError::MissingField("room_id").code(), "missing_room_id");
    }

    #[test]
    fn test_missing_store_function_code() {
        assert_eq!(
            RosterError::MissingStoreFunction("assert_room_ready").code(),
            "missing_assert_room_ready"
        );
        assert_eq!(
            RosterError::MissingStoreFunction("ensure_rank_session_for_room").code(),
            "missing_ensure_rank_session_for_room"
        );
    }

    #[test]
    fn test_conflict_message_names_versions() {
        let error = RosterError::SlotVersionConflict {
            incoming: 99,
            stored: 100,
        };
        let text = format!("{error}");
        assert!(text.contains("99"));
        assert!(text.contains("100"));
    }

    #[tokio::test]
    async fn test_into_response_conflict() {
        let error = RosterError::SlotVersionConflict {
            incoming: 99,
            stored: 100,
        };
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "slot_version_conflict");
    }

    #[tokio::test]
    async fn test_into_response_unauthorized_sets_www_authenticate() {
        let error = RosterError::InvalidToken("token expired".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let www_auth = response.headers().get("WWW-Authenticate");
        assert!(www_auth.is_some());
        assert!(www_auth
            .unwrap()
            .to_str()
            .unwrap()
            .contains("Bearer realm=\"rally-lobby-api\""));

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_into_response_database_error_is_generic() {
        let error = RosterError::Database("connection refused at 10.0.0.3".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "database_error");
        let message = body_json["error"]["message"].as_str().unwrap();
        assert!(!message.contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn test_into_response_missing_store_function_names_function() {
        let error = RosterError::MissingStoreFunction("fetch_candidate_pool");
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "missing_fetch_candidate_pool");
        assert!(body_json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("fetch_candidate_pool"));
    }
}
