//! Sessions repository: session lookup, ensure, meta upsert, turn events,
//! and the authorization grant lookups.
//!
//! Sessions are created exactly once by `ensure_rank_session_for_room` and
//! only updated afterwards; the meta upsert merges a sanitized partial patch
//! in place.

use crate::errors::RosterError;
use crate::models::{RealtimeMode, SanitizedMetaPatch, SessionRow, TurnEventRow, TurnStatePayload};
use crate::observability::metrics;
use crate::repositories::map_store_error;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Shared column list for session reads.
const SESSION_SELECT_COLUMNS: &str = r#"
    session_id, owner_id, room_id, game_id, match_instance_id,
    selected_time_limit_seconds, time_vote, drop_in_bonus_seconds,
    turn_state, async_fill_snapshot, realtime_mode, updated_at
"#;

/// Sessions repository for database operations.
pub struct SessionsRepository;

impl SessionsRepository {
    /// Look up a session by id.
    #[instrument(skip_all, name = "roster.repo.session_by_id")]
    pub async fn session_by_id(
        pool: &PgPool,
        session_id: Uuid,
    ) -> Result<Option<SessionRow>, RosterError> {
        let start = Instant::now();

        let query = format!(
            "SELECT {SESSION_SELECT_COLUMNS} FROM rank_sessions WHERE session_id = $1"
        );

        let row = sqlx::query(&query)
            .bind(session_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("session_by_id", "error", start.elapsed());
                RosterError::Database(e.to_string())
            })?;

        metrics::record_db_query("session_by_id", "success", start.elapsed());

        Ok(row.map(map_row_to_session))
    }

    /// Ensure a session exists for a room and return its id.
    ///
    /// The store function is atomic: concurrent callers racing on the same
    /// room all receive the same session id.
    #[instrument(skip_all, name = "roster.repo.ensure_session")]
    pub async fn ensure_session(
        pool: &PgPool,
        room_id: Uuid,
        game_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Uuid, RosterError> {
        let start = Instant::now();

        let row = sqlx::query(
            "SELECT ensure_rank_session_for_room($1, $2, $3) AS session_id",
        )
        .bind(room_id)
        .bind(game_id)
        .bind(owner_id)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("ensure_rank_session_for_room", "error", start.elapsed());
            map_store_error("ensure_rank_session_for_room", e)
        })?;

        metrics::record_db_query("ensure_rank_session_for_room", "success", start.elapsed());

        row.get::<Option<Uuid>, _>("session_id")
            .ok_or(RosterError::SessionIdUnavailable)
    }

    /// Merge a sanitized meta patch into the session row.
    ///
    /// Absent patch fields leave the stored value untouched. The session row
    /// is never recreated here; a missing session is `session_not_found`.
    #[instrument(skip_all, name = "roster.repo.update_meta", fields(session_id = %session_id))]
    pub async fn update_meta(
        pool: &PgPool,
        session_id: Uuid,
        patch: &SanitizedMetaPatch,
    ) -> Result<SessionRow, RosterError> {
        let start = Instant::now();

        let query = format!(
            r#"
            UPDATE rank_sessions
            SET
                selected_time_limit_seconds = COALESCE($2, selected_time_limit_seconds),
                time_vote = COALESCE($3, time_vote),
                drop_in_bonus_seconds = COALESCE($4, drop_in_bonus_seconds),
                turn_state = COALESCE($5, turn_state),
                async_fill_snapshot = COALESCE($6, async_fill_snapshot),
                realtime_mode = COALESCE($7, realtime_mode),
                updated_at = NOW()
            WHERE session_id = $1
            RETURNING {SESSION_SELECT_COLUMNS}
            "#
        );

        let row = sqlx::query(&query)
            .bind(session_id) // $1
            .bind(patch.selected_time_limit_seconds) // $2
            .bind(patch.time_vote.clone()) // $3
            .bind(patch.drop_in_bonus_seconds) // $4
            .bind(patch.turn_state.clone()) // $5
            .bind(patch.async_fill_snapshot.clone()) // $6
            .bind(patch.realtime_mode.map(|m| m.as_str())) // $7
            .fetch_optional(pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("update_session_meta", "error", start.elapsed());
                RosterError::UpsertFailed(e.to_string())
            })?
            .ok_or(RosterError::SessionNotFound)?;

        metrics::record_db_query("update_session_meta", "success", start.elapsed());

        Ok(map_row_to_session(row))
    }

    /// Store an async-fill snapshot on the session, best-effort.
    #[instrument(skip_all, name = "roster.repo.store_async_fill")]
    pub async fn store_async_fill_snapshot(
        pool: &PgPool,
        session_id: Uuid,
        snapshot: &serde_json::Value,
    ) -> Result<(), RosterError> {
        sqlx::query(
            "UPDATE rank_sessions SET async_fill_snapshot = $2, updated_at = NOW() WHERE session_id = $1",
        )
        .bind(session_id)
        .bind(snapshot)
        .execute(pool)
        .await
        .map_err(|e| RosterError::Database(e.to_string()))?;

        Ok(())
    }

    /// Append a sequenced turn-state event.
    ///
    /// When the payload carries no turn number the store sequences the next
    /// one; ordering within a session is turn number plus insertion order.
    #[instrument(skip_all, name = "roster.repo.insert_turn_event", fields(session_id = %session_id))]
    pub async fn insert_turn_event(
        pool: &PgPool,
        session_id: Uuid,
        payload: &TurnStatePayload,
    ) -> Result<TurnEventRow, RosterError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            INSERT INTO session_turn_events (session_id, turn_number, emitter_id, source, extras)
            VALUES (
                $1,
                COALESCE(
                    $2,
                    (SELECT COALESCE(MAX(turn_number), 0) + 1
                     FROM session_turn_events
                     WHERE session_id = $1)
                ),
                $3, $4, $5
            )
            RETURNING session_id, turn_number, emitter_id, source, extras, created_at
            "#,
        )
        .bind(session_id) // $1
        .bind(payload.turn_number) // $2
        .bind(payload.emitter_id) // $3
        .bind(payload.source.clone()) // $4
        .bind(payload.extras.clone()) // $5
        .fetch_one(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("insert_turn_event", "error", start.elapsed());
            RosterError::Database(e.to_string())
        })?;

        metrics::record_db_query("insert_turn_event", "success", start.elapsed());

        Ok(TurnEventRow {
            session_id: row.get("session_id"),
            turn_number: row.get("turn_number"),
            emitter_id: row.get("emitter_id"),
            source: row.get("source"),
            extras: row.get("extras"),
            created_at: row.get("created_at"),
        })
    }

    // ========================================================================
    // Authorization grant lookups
    // ========================================================================

    /// Whether `owner` occupies a `room_slot` of a room belonging to the
    /// session's owner for the session's game.
    #[instrument(skip_all, name = "roster.repo.is_room_slot_occupant")]
    pub async fn is_room_slot_occupant(
        pool: &PgPool,
        owner_id: Uuid,
        session_owner_id: Uuid,
        game_id: Uuid,
    ) -> Result<bool, RosterError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM room_slots rs
                JOIN rooms r ON r.room_id = rs.room_id
                WHERE rs.owner_id = $1
                  AND r.owner_id = $2
                  AND r.game_id = $3
            ) AS occupant
            "#,
        )
        .bind(owner_id)
        .bind(session_owner_id)
        .bind(game_id)
        .fetch_one(pool)
        .await
        .map_err(|e| RosterError::Database(e.to_string()))?;

        Ok(row.get("occupant"))
    }

    /// Whether `owner` appears in the match roster of a given instance for a
    /// matching game.
    #[instrument(skip_all, name = "roster.repo.is_instance_roster_member")]
    pub async fn is_instance_roster_member(
        pool: &PgPool,
        match_instance_id: Uuid,
        game_id: Uuid,
        owner_id: Uuid,
    ) -> Result<bool, RosterError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM match_roster
                WHERE match_instance_id = $1
                  AND game_id = $2
                  AND owner_id = $3
            ) AS member
            "#,
        )
        .bind(match_instance_id)
        .bind(game_id)
        .bind(owner_id)
        .fetch_one(pool)
        .await
        .map_err(|e| RosterError::Database(e.to_string()))?;

        Ok(row.get("member"))
    }

    /// Whether `owner` is a ranked participant of the game.
    #[instrument(skip_all, name = "roster.repo.is_rank_participant")]
    pub async fn is_rank_participant(
        pool: &PgPool,
        game_id: Uuid,
        owner_id: Uuid,
    ) -> Result<bool, RosterError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM rank_participants
                WHERE game_id = $1 AND owner_id = $2
            ) AS participant
            "#,
        )
        .bind(game_id)
        .bind(owner_id)
        .fetch_one(pool)
        .await
        .map_err(|e| RosterError::Database(e.to_string()))?;

        Ok(row.get("participant"))
    }
}

/// Map a database row to a `SessionRow`.
pub fn map_row_to_session(row: sqlx::postgres::PgRow) -> SessionRow {
    let realtime_mode: String = row.get("realtime_mode");
    SessionRow {
        session_id: row.get("session_id"),
        owner_id: row.get("owner_id"),
        room_id: row.get("room_id"),
        game_id: row.get("game_id"),
        match_instance_id: row.get("match_instance_id"),
        selected_time_limit_seconds: row.get("selected_time_limit_seconds"),
        time_vote: row.get("time_vote"),
        drop_in_bonus_seconds: row.get("drop_in_bonus_seconds"),
        turn_state: row.get("turn_state"),
        async_fill_snapshot: row.get("async_fill_snapshot"),
        realtime_mode: RealtimeMode::parse_lenient(&realtime_mode),
        updated_at: row.get("updated_at"),
    }
}
