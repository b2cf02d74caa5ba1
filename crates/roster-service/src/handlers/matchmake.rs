//! Handler for POST /api/v1/matchmake.
//!
//! Runs role/score assignment over a submitted candidate queue. A queue
//! that cannot fill even one room is not an HTTP error: the response
//! carries `ready: false` plus the starved roles so the lobby can widen
//! its net or keep waiting.

use crate::errors::RosterError;
use crate::models::{MatchmakeRequest, MatchmakeResponse};
use crate::services::matchmaking::{plan_rooms, MatchPlanRequest, MatchmakingError};
use axum::Json;
use tracing::{info, instrument};

/// Handler for POST /api/v1/matchmake
///
/// # Response
///
/// - 200 OK: `{ready, rooms, starved_roles}`
/// - 400 Bad Request: `missing_roles` / `invalid_payload`
/// - 401 Unauthorized: invalid or missing token
#[instrument(
    skip_all,
    name = "roster.matchmake",
    fields(method = "POST", endpoint = "/api/v1/matchmake")
)]
pub async fn matchmake(body: axum::body::Bytes) -> Result<Json<MatchmakeResponse>, RosterError> {
    // Deserialize manually to return 400 (not Axum's default 422)
    let request: MatchmakeRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(target: "roster.handlers.matchmake", error = %e, "Invalid request body");
        RosterError::InvalidPayload("Invalid request body".to_string())
    })?;

    let roles = request.roles.ok_or(RosterError::MissingField("roles"))?;

    let plan_request = MatchPlanRequest {
        roles,
        queue: request.queue,
        score_windows: request.score_windows,
        casual: request.casual,
        target_score: request.target_score,
    };

    match plan_rooms(&plan_request) {
        Ok(plan) => {
            info!(
                target: "roster.handlers.matchmake",
                rooms = plan.rooms.len(),
                casual = plan_request.casual,
                "Matchmaking produced room assignments"
            );
            Ok(Json(MatchmakeResponse {
                ready: true,
                rooms: plan.rooms,
                starved_roles: vec![],
            }))
        }
        Err(MatchmakingError::RoleStarved { roles }) => {
            info!(
                target: "roster.handlers.matchmake",
                starved = ?roles,
                "Matchmaking could not fill a room"
            );
            Ok(Json(MatchmakeResponse {
                ready: false,
                rooms: vec![],
                starved_roles: roles,
            }))
        }
        Err(MatchmakingError::InvalidRequest(reason)) => {
            Err(RosterError::InvalidPayload(reason))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    #[tokio::test]
    async fn test_matchmake_ready_room() {
        let body = serde_json::json!({
            "roles": [
                {"name": "tank", "slot_count": 1},
                {"name": "dps", "slot_count": 1}
            ],
            "queue": [
                {"owner_id": uuid::Uuid::new_v4(), "role": "tank", "score": 1500},
                {"owner_id": uuid::Uuid::new_v4(), "role": "dps", "score": 1510}
            ]
        });

        let response = matchmake(Bytes::from(body.to_string())).await.unwrap();
        assert!(response.0.ready);
        assert_eq!(response.0.rooms.len(), 1);
    }

    #[tokio::test]
    async fn test_matchmake_starved_is_not_an_error() {
        let body = serde_json::json!({
            "roles": [{"name": "tank", "slot_count": 1}],
            "queue": []
        });

        let response = matchmake(Bytes::from(body.to_string())).await.unwrap();
        assert!(!response.0.ready);
        assert_eq!(response.0.starved_roles, vec!["tank".to_string()]);
    }

    #[tokio::test]
    async fn test_matchmake_missing_roles() {
        let body = serde_json::json!({ "queue": [] });

        let err = matchmake(Bytes::from(body.to_string())).await.unwrap_err();
        assert_eq!(err.code(), "missing_roles");
    }

    #[tokio::test]
    async fn test_matchmake_malformed_body() {
        let err = matchmake(Bytes::from_static(b"{not json"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_payload");
    }
}
