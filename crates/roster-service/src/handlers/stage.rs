//! Handler for POST /api/v1/stage-room-match.
//!
//! Commits a staged roster snapshot under optimistic concurrency, then
//! ensures the room's session exists and links it into the response. Only
//! the room's owner may stage; the store rejects stale template versions
//! atomically with `slot_version_conflict`.

use crate::errors::RosterError;
use crate::models::{RosterSlot, StageRoomMatchRequest, StageRoomMatchResponse};
use crate::repositories::{CommitRequest, RostersRepository, SessionsRepository};
use crate::routes::AppState;
use axum::{extract::State, Extension, Json};
use chrono::Utc;
use common::jwt::PlayerClaims;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Handler for POST /api/v1/stage-room-match
///
/// # Authorization
///
/// The caller must be the room's owner.
///
/// # Response
///
/// - 200 OK: roster committed, session ensured
/// - 400 Bad Request: `missing_*` / `empty_roster` / `roles_slots_invalid` /
///   `room_not_ready` / `invalid_payload`
/// - 401 Unauthorized / 403 Forbidden / 404 `room_not_found`
/// - 409 `slot_version_conflict`
/// - 500 `missing_assert_room_ready` / `missing_ensure_rank_session_for_room`
///   / `session_id_unavailable`
#[instrument(
    skip_all,
    name = "roster.stage_room_match",
    fields(method = "POST", endpoint = "/api/v1/stage-room-match")
)]
pub async fn stage_room_match(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<PlayerClaims>,
    body: axum::body::Bytes,
) -> Result<Json<StageRoomMatchResponse>, RosterError> {
    // Deserialize manually to return 400 (not Axum's default 422)
    let request: StageRoomMatchRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(target: "roster.handlers.stage", error = %e, "Invalid request body");
        RosterError::InvalidPayload("Invalid request body".to_string())
    })?;

    request.validate()?;

    let (Some(match_instance_id), Some(room_id), Some(game_id), Some(template)) = (
        request.match_instance_id,
        request.room_id,
        request.game_id,
        request.slot_template,
    ) else {
        return Err(RosterError::InvalidPayload(
            "validated fields unexpectedly absent".to_string(),
        ));
    };

    let caller = claims
        .owner_id()
        .map_err(|_| RosterError::InvalidToken("Invalid player identifier in token".to_string()))?;

    // Only the room's owner may stage a match.
    let room_owner = RostersRepository::room_owner(&state.pool, room_id)
        .await?
        .ok_or(RosterError::RoomNotFound)?;

    if room_owner != caller {
        warn!(
            target: "roster.handlers.stage",
            room_id = %room_id,
            caller = %caller,
            "Non-owner attempted to stage a room match"
        );
        return Err(RosterError::Forbidden(
            "Only the room owner can stage a match".to_string(),
        ));
    }

    // Readiness predicate, asserted server-side unless the caller opted
    // into a partial stage.
    if !request.allow_partial {
        let ready =
            RostersRepository::assert_room_ready(&state.pool, room_id, match_instance_id).await?;
        if !ready {
            return Err(RosterError::RoomNotReady);
        }
    }

    // Normalize the submitted seats into full roster rows.
    let now = Utc::now();
    let hero_map = request.hero_map;
    let roster: Vec<RosterSlot> = request
        .roster
        .into_iter()
        .map(|payload| payload.into_slot(&hero_map, now))
        .collect();

    // Atomic, version-checked merge; stale writers get the conflict.
    let outcome = RostersRepository::commit(
        &state.pool,
        &CommitRequest {
            match_instance_id,
            room_id,
            game_id,
            requested_by: caller,
            template_version: template.version,
            template_source: &template.source,
            template_updated_at: template.updated_at,
            roster: &roster,
        },
    )
    .await?;

    // Ensure the session exists and link it into the response.
    let session_id =
        SessionsRepository::ensure_session(&state.pool, room_id, game_id, caller).await?;

    // Async-fill snapshot rides along best-effort.
    if let Some(snapshot) = &request.async_fill_meta {
        if let Err(e) =
            SessionsRepository::store_async_fill_snapshot(&state.pool, session_id, snapshot).await
        {
            warn!(
                target: "roster.handlers.stage",
                session_id = %session_id,
                error = %e,
                "Failed to store async-fill snapshot"
            );
        }
    }

    info!(
        target: "roster.handlers.stage",
        room_id = %room_id,
        match_instance_id = %match_instance_id,
        version = outcome.committed_version,
        staged = outcome.inserted_rows,
        session_id = %session_id,
        "Roster staged"
    );

    Ok(Json(StageRoomMatchResponse {
        ok: true,
        staged: outcome.inserted_rows,
        slot_template_version: outcome.committed_version,
        slot_template_updated_at: outcome.committed_at,
        session_id,
        ready_vote: request.ready_vote,
    }))
}
