//! Handler for POST /api/v1/ready-timeout.
//!
//! Fills seats whose occupant missed the readiness deadline. The client's
//! deadline tracker supplies the missing owners; the selector finds a
//! standin per seat (widening score tolerance, falling back across roles,
//! synthesizing a placeholder as the last resort) and the patched roster is
//! committed through the same version-checked merge as a normal stage.

use crate::errors::RosterError;
use crate::models::{
    BackfillDiagnostics, ReadyTimeoutRequest, ReadyTimeoutResponse, SeatAssignmentView,
    TimelineEvent,
};
use crate::observability::backfill_trail::BackfillRecord;
use crate::observability::metrics;
use crate::repositories::candidates::hero_summaries;
use crate::repositories::{CommitRequest, RostersRepository, SessionsRepository};
use crate::routes::AppState;
use crate::services::standin::{fill_vacant_seats, merge_fills_into_roster, VacantSeat};
use crate::services::timeline::EVENT_STANDIN_BACKFILL;
use axum::{extract::State, Extension, Json};
use chrono::Utc;
use common::jwt::PlayerClaims;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Template source recorded on backfill commits.
const BACKFILL_TEMPLATE_SOURCE: &str = "ready_timeout_backfill";

/// Handler for POST /api/v1/ready-timeout
///
/// # Authorization
///
/// The caller must be the room's owner or a member of its current roster.
///
/// # Response
///
/// - 200 OK: seats filled (or `updated: false` with `no_target_seats`)
/// - 400 Bad Request: `missing_*` / `invalid_payload`
/// - 401 Unauthorized / 403 Forbidden
/// - 404 `room_not_found` / `roster_not_found`
/// - 500 `rpc_failed` / `sync_failed` / `missing_fetch_candidate_pool`
#[instrument(
    skip_all,
    name = "roster.ready_timeout",
    fields(method = "POST", endpoint = "/api/v1/ready-timeout")
)]
pub async fn ready_timeout(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<PlayerClaims>,
    body: axum::body::Bytes,
) -> Result<Json<ReadyTimeoutResponse>, RosterError> {
    let start = Instant::now();

    // Deserialize manually to return 400 (not Axum's default 422)
    let request: ReadyTimeoutRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(target: "roster.handlers.ready_timeout", error = %e, "Invalid request body");
        RosterError::InvalidPayload("Invalid request body".to_string())
    })?;

    request.validate()?;

    let (Some(match_instance_id), Some(game_id), Some(room_id)) =
        (request.match_instance_id, request.game_id, request.room_id)
    else {
        return Err(RosterError::InvalidPayload(
            "validated fields unexpectedly absent".to_string(),
        ));
    };

    let caller = claims
        .owner_id()
        .map_err(|_| RosterError::InvalidToken("Invalid player identifier in token".to_string()))?;

    // Room owner or current roster member may trigger a backfill.
    let room_owner = RostersRepository::room_owner(&state.pool, room_id)
        .await?
        .ok_or(RosterError::RoomNotFound)?;

    if room_owner != caller && !RostersRepository::is_roster_member(&state.pool, room_id, caller).await? {
        warn!(
            target: "roster.handlers.ready_timeout",
            room_id = %room_id,
            caller = %caller,
            "Caller is neither room owner nor roster member"
        );
        return Err(RosterError::Forbidden(
            "Only the room owner or a roster member can trigger a backfill".to_string(),
        ));
    }

    let roster = RostersRepository::current_roster(&state.pool, room_id, match_instance_id).await?;
    if roster.is_empty() {
        return Err(RosterError::RosterNotFound);
    }

    // Target seats: occupants named by the client's deadline tracker.
    let missing: HashSet<Uuid> = request.missing_owner_ids.iter().copied().collect();
    let seats: Vec<VacantSeat> = roster
        .iter()
        .filter(|slot| slot.owner_id.is_some_and(|owner| missing.contains(&owner)))
        .map(VacantSeat::from_slot)
        .collect();

    if seats.is_empty() {
        return Ok(Json(ReadyTimeoutResponse {
            updated: false,
            message: Some("no_target_seats".to_string()),
            assignments: vec![],
            placeholders: 0,
            diagnostics: BackfillDiagnostics::default(),
        }));
    }

    // Owners keeping their seats must not be seated twice.
    let mut seated_owners: HashSet<Uuid> = roster
        .iter()
        .filter_map(|slot| slot.owner_id)
        .filter(|owner| !missing.contains(owner))
        .collect();

    let mut rng = StdRng::from_entropy();
    let outcome = fill_vacant_seats(
        state.candidates.as_ref(),
        game_id,
        &seats,
        &mut seated_owners,
        &mut rng,
    )
    .await?;

    // Hero summaries: one batch query for every chosen candidate.
    let mut hero_ids: Vec<i64> = outcome
        .fills
        .iter()
        .filter_map(|fill| fill.candidate.hero_id)
        .collect();
    hero_ids.sort_unstable();
    hero_ids.dedup();

    let hero_names = hero_summaries(&state.pool, &hero_ids)
        .await
        .map_err(|e| match e {
            missing @ RosterError::MissingStoreFunction(_) => missing,
            other => RosterError::RpcFailed(other.to_string()),
        })?;

    // Merge replacements into the roster and commit at a fresh version.
    let now = Utc::now();
    let patched = merge_fills_into_roster(&roster, &outcome.fills, &hero_names, now);

    let commit = RostersRepository::commit(
        &state.pool,
        &CommitRequest {
            match_instance_id,
            room_id,
            game_id,
            requested_by: caller,
            template_version: now.timestamp_millis(),
            template_source: BACKFILL_TEMPLATE_SOURCE,
            template_updated_at: now,
            roster: &patched,
        },
    )
    .await
    .map_err(|e| match e {
        missing @ RosterError::MissingStoreFunction(_) => missing,
        other => RosterError::SyncFailed(other.to_string()),
    })?;

    // Timeline record, best-effort: the backfill is committed either way.
    publish_backfill_event(&state, room_id, game_id, room_owner, match_instance_id, &outcome).await;

    state.backfill_trail.record(BackfillRecord {
        room_id,
        match_instance_id,
        requested_seats: outcome.diagnostics.requested_seats,
        placeholders: outcome.placeholders,
        diagnostics: outcome.diagnostics.clone(),
        recorded_at: now,
    });
    metrics::record_backfill(
        outcome.diagnostics.requested_seats,
        outcome.placeholders,
        start.elapsed(),
    );

    info!(
        target: "roster.handlers.ready_timeout",
        room_id = %room_id,
        match_instance_id = %match_instance_id,
        seats = outcome.diagnostics.requested_seats,
        placeholders = outcome.placeholders,
        committed_version = commit.committed_version,
        "Standin backfill committed"
    );

    let assignments = outcome
        .fills
        .iter()
        .map(|fill| SeatAssignmentView {
            slot_index: fill.slot_index,
            owner_id: fill.candidate.owner_id,
            hero_id: fill.candidate.hero_id,
            tolerance: fill.tolerance,
        })
        .collect();

    Ok(Json(ReadyTimeoutResponse {
        updated: true,
        message: None,
        assignments,
        placeholders: outcome.placeholders,
        diagnostics: outcome.diagnostics,
    }))
}

/// Publish the backfill timeline event; failures are logged, never surfaced.
async fn publish_backfill_event(
    state: &AppState,
    room_id: Uuid,
    game_id: Uuid,
    room_owner: Uuid,
    match_instance_id: Uuid,
    outcome: &crate::services::standin::BackfillOutcome,
) {
    let session_id =
        match SessionsRepository::ensure_session(&state.pool, room_id, game_id, room_owner).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    target: "roster.handlers.ready_timeout",
                    room_id = %room_id,
                    error = %e,
                    "Could not resolve session for backfill timeline event"
                );
                return;
            }
        };

    let event = TimelineEvent {
        event_id: None,
        event_type: EVENT_STANDIN_BACKFILL.to_string(),
        owner_id: None,
        turn: 0,
        occurred_at: Utc::now(),
        reason: Some("ready_timeout".to_string()),
        context: Some(room_id.to_string()),
        metadata: serde_json::json!({
            "match_instance_id": match_instance_id,
            "requested_seats": outcome.diagnostics.requested_seats,
            "placeholders": outcome.placeholders,
            "role_fallbacks": outcome.diagnostics.role_fallbacks,
        }),
    };

    if let Err(e) = state.timeline.publish(session_id, event).await {
        warn!(
            target: "roster.handlers.ready_timeout",
            session_id = %session_id,
            error = %e,
            "Failed to publish backfill timeline event"
        );
    }
}
