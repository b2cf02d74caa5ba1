//! Handler for POST /api/v1/session-meta.
//!
//! Authorizes the caller through the ordered grant policy, merges a
//! sanitized session meta patch, and optionally sequences a turn-state
//! event. When the event's extras indicate a drop-in bonus was just
//! applied, a single timeline event describing the extension is derived and
//! published best-effort; its failure never rolls back the meta upsert.

use crate::errors::RosterError;
use crate::models::{SessionMetaRequest, SessionMetaResponse};
use crate::repositories::SessionsRepository;
use crate::routes::AppState;
use crate::services::access::{AccessContext, AccessPolicy};
use crate::services::timeline::drop_in_bonus_event;
use axum::{extract::State, Extension, Json};
use common::jwt::PlayerClaims;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Handler for POST /api/v1/session-meta
///
/// # Authorization
///
/// Session owner, room roster member, room-slot occupant, instance roster
/// member, or listed collaborator who is also a ranked participant.
///
/// # Response
///
/// - 200 OK: `{ok, meta, event, timelineEvent}`
/// - 400 Bad Request: `missing_session_id` / `invalid_payload` /
///   `session_game_mismatch`
/// - 401 Unauthorized / 403 Forbidden / 404 `session_not_found`
/// - 500 `upsert_failed`
#[instrument(
    skip_all,
    name = "roster.session_meta",
    fields(method = "POST", endpoint = "/api/v1/session-meta")
)]
pub async fn session_meta(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<PlayerClaims>,
    body: axum::body::Bytes,
) -> Result<Json<SessionMetaResponse>, RosterError> {
    // Deserialize manually to return 400 (not Axum's default 422)
    let request: SessionMetaRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(target: "roster.handlers.session_meta", error = %e, "Invalid request body");
        RosterError::InvalidPayload("Invalid request body".to_string())
    })?;

    request.validate()?;

    let Some(session_id) = request.session_id else {
        return Err(RosterError::MissingField("session_id"));
    };

    let caller = claims
        .owner_id()
        .map_err(|_| RosterError::InvalidToken("Invalid player identifier in token".to_string()))?;

    let session = SessionsRepository::session_by_id(&state.pool, session_id)
        .await?
        .ok_or(RosterError::SessionNotFound)?;

    // A caller-declared game that disagrees with the session row is a
    // deterministic client bug, reported as its own code.
    if let Some(declared_game) = request.game_id {
        if declared_game != session.game_id {
            return Err(RosterError::SessionGameMismatch);
        }
    }

    let policy = AccessPolicy::standard(state.pool.clone());
    let granted_by = policy
        .authorize(&AccessContext {
            caller,
            session: session.clone(),
            declared_match_instance_id: request.match_instance_id,
            collaborators: request.collaborators.clone(),
        })
        .await?;

    // Merge the sanitized patch; an absent patch leaves the row untouched.
    let meta = match request.meta {
        Some(patch) => {
            SessionsRepository::update_meta(&state.pool, session_id, &patch.sanitize()).await?
        }
        None => session,
    };

    // Optional turn-state event, sequenced by the store.
    let mut event = None;
    let mut timeline_event = None;

    if let Some(payload) = &request.turn_state_event {
        let row = SessionsRepository::insert_turn_event(&state.pool, session_id, payload).await?;

        if let Some(bonus_event) = drop_in_bonus_event(session_id, &row) {
            match state.timeline.publish(session_id, bonus_event).await {
                Ok(stored) => timeline_event = Some(stored),
                Err(e) => {
                    warn!(
                        target: "roster.handlers.session_meta",
                        session_id = %session_id,
                        error = %e,
                        "Failed to publish drop-in bonus timeline event"
                    );
                }
            }
        }

        event = Some(row);
    }

    info!(
        target: "roster.handlers.session_meta",
        session_id = %session_id,
        granted_by = granted_by,
        turn_event = event.is_some(),
        "Session meta updated"
    );

    Ok(Json(SessionMetaResponse {
        ok: true,
        meta,
        event,
        timeline_event,
    }))
}
