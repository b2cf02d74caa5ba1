//! Roster repository: version-checked commits and version-scoped reads.
//!
//! The commit path is the optimistic-concurrency backbone of the lobby.
//! `sync_match_roster` compares the incoming template version against the
//! highest version stored for the room and either applies the whole merge or
//! rejects it — there is no read-then-write in this process, so concurrent
//! owners and browser tabs cannot interleave a stale write.

use crate::errors::RosterError;
use crate::models::RosterSlot;
use crate::observability::metrics;
use crate::repositories::map_store_error;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// A roster commit request, handed to the store as one atomic call.
#[derive(Debug, Clone)]
pub struct CommitRequest<'a> {
    pub match_instance_id: Uuid,
    pub room_id: Uuid,
    pub game_id: Uuid,

    /// Owner on whose behalf the commit runs (already authorized).
    pub requested_by: Uuid,

    pub template_version: i64,
    pub template_source: &'a str,
    pub template_updated_at: DateTime<Utc>,
    pub roster: &'a [RosterSlot],
}

/// Result of a successful roster commit.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub committed_version: i64,
    pub committed_at: DateTime<Utc>,
    pub inserted_rows: i64,
}

/// Shared column list for roster reads.
const ROSTER_SELECT_COLUMNS: &str = r#"
    slot_index, slot_id, role, owner_id, hero_id, hero_name,
    ready, joined_at, standin, match_source,
    score, rating, battles, win_rate, status
"#;

/// Roster repository for database operations.
pub struct RostersRepository;

impl RostersRepository {
    /// Look up the owner of a room. Returns `None` when the room is missing.
    #[instrument(skip_all, name = "roster.repo.room_owner")]
    pub async fn room_owner(pool: &PgPool, room_id: Uuid) -> Result<Option<Uuid>, RosterError> {
        let start = Instant::now();

        let row = sqlx::query("SELECT owner_id FROM rooms WHERE room_id = $1")
            .bind(room_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("room_owner", "error", start.elapsed());
                RosterError::Database(e.to_string())
            })?;

        metrics::record_db_query("room_owner", "success", start.elapsed());

        Ok(row.map(|r| r.get("owner_id")))
    }

    /// Assert the room's readiness predicate server-side.
    ///
    /// A missing `assert_room_ready` function is a deployment
    /// misconfiguration, not a user-facing failure.
    #[instrument(skip_all, name = "roster.repo.assert_room_ready")]
    pub async fn assert_room_ready(
        pool: &PgPool,
        room_id: Uuid,
        match_instance_id: Uuid,
    ) -> Result<bool, RosterError> {
        let start = Instant::now();

        let row = sqlx::query("SELECT assert_room_ready($1, $2) AS ready")
            .bind(room_id)
            .bind(match_instance_id)
            .fetch_one(pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("assert_room_ready", "error", start.elapsed());
                map_store_error("assert_room_ready", e)
            })?;

        metrics::record_db_query("assert_room_ready", "success", start.elapsed());

        Ok(row.get::<Option<bool>, _>("ready").unwrap_or(false))
    }

    /// Commit a roster snapshot through the store's atomic merge.
    ///
    /// The store compares `template_version` against the highest version it
    /// holds for the room; stale versions reject the whole commit with
    /// `slot_version_conflict` and leave storage unchanged.
    #[instrument(
        skip_all,
        name = "roster.repo.commit",
        fields(room_id = %request.room_id, version = request.template_version)
    )]
    pub async fn commit(
        pool: &PgPool,
        request: &CommitRequest<'_>,
    ) -> Result<CommitOutcome, RosterError> {
        let start = Instant::now();

        let roster_json = serde_json::to_value(request.roster)
            .map_err(|e| RosterError::Internal(format!("roster serialization failed: {e}")))?;

        let row = sqlx::query(
            r#"
            SELECT status, committed_version, committed_at, inserted_rows, stored_version
            FROM sync_match_roster($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(request.match_instance_id) // $1
        .bind(request.room_id) // $2
        .bind(request.game_id) // $3
        .bind(request.requested_by) // $4
        .bind(request.template_version) // $5
        .bind(request.template_source) // $6
        .bind(request.template_updated_at) // $7
        .bind(roster_json) // $8
        .fetch_one(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("sync_match_roster", "error", start.elapsed());
            metrics::record_roster_commit("error", Some("db_error"));
            map_store_error("sync_match_roster", e)
        })?;

        metrics::record_db_query("sync_match_roster", "success", start.elapsed());

        let status: String = row.get("status");
        let outcome = commit_outcome_from_status(
            &status,
            request.template_version,
            row.get("committed_version"),
            row.get("committed_at"),
            row.get("inserted_rows"),
            row.get("stored_version"),
        );

        match &outcome {
            Ok(_) => metrics::record_roster_commit("success", None),
            Err(RosterError::SlotVersionConflict { .. }) => {
                metrics::record_roster_commit("error", Some("version_conflict"));
            }
            Err(_) => metrics::record_roster_commit("error", Some("rejected")),
        }

        outcome
    }

    /// Read the newest roster snapshot for a room/instance.
    ///
    /// Rows from superseded versions stay in the store; reads are scoped to
    /// the highest committed version.
    #[instrument(skip_all, name = "roster.repo.current_roster")]
    pub async fn current_roster(
        pool: &PgPool,
        room_id: Uuid,
        match_instance_id: Uuid,
    ) -> Result<Vec<RosterSlot>, RosterError> {
        let start = Instant::now();

        let query = format!(
            r#"
            SELECT {ROSTER_SELECT_COLUMNS}
            FROM match_roster
            WHERE room_id = $1
              AND match_instance_id = $2
              AND template_version = (
                  SELECT MAX(template_version)
                  FROM match_roster
                  WHERE room_id = $1 AND match_instance_id = $2
              )
            ORDER BY slot_index
            "#
        );

        let rows = sqlx::query(&query)
            .bind(room_id)
            .bind(match_instance_id)
            .fetch_all(pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("current_roster", "error", start.elapsed());
                RosterError::Database(e.to_string())
            })?;

        metrics::record_db_query("current_roster", "success", start.elapsed());

        Ok(rows.into_iter().map(map_row_to_slot).collect())
    }

    /// Whether `owner` holds a seat in the newest roster snapshot of a room.
    #[instrument(skip_all, name = "roster.repo.is_roster_member")]
    pub async fn is_roster_member(
        pool: &PgPool,
        room_id: Uuid,
        owner_id: Uuid,
    ) -> Result<bool, RosterError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM match_roster
                WHERE room_id = $1
                  AND owner_id = $2
                  AND template_version = (
                      SELECT MAX(template_version)
                      FROM match_roster
                      WHERE room_id = $1
                  )
            ) AS member
            "#,
        )
        .bind(room_id)
        .bind(owner_id)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("is_roster_member", "error", start.elapsed());
            RosterError::Database(e.to_string())
        })?;

        metrics::record_db_query("is_roster_member", "success", start.elapsed());

        Ok(row.get("member"))
    }
}

/// Interpret the `sync_match_roster` result row.
///
/// Split out of the query path so the status mapping is testable without a
/// live store.
fn commit_outcome_from_status(
    status: &str,
    incoming_version: i64,
    committed_version: Option<i64>,
    committed_at: Option<DateTime<Utc>>,
    inserted_rows: Option<i64>,
    stored_version: Option<i64>,
) -> Result<CommitOutcome, RosterError> {
    match status {
        "committed" => Ok(CommitOutcome {
            committed_version: committed_version.unwrap_or(incoming_version),
            committed_at: committed_at.unwrap_or_else(Utc::now),
            inserted_rows: inserted_rows.unwrap_or(0),
        }),
        "slot_version_conflict" => Err(RosterError::SlotVersionConflict {
            incoming: incoming_version,
            stored: stored_version.unwrap_or(incoming_version),
        }),
        "room_not_found" => Err(RosterError::RoomNotFound),
        "empty_roster" => Err(RosterError::EmptyRoster),
        other => Err(RosterError::SyncFailed(format!(
            "store returned unknown commit status `{other}`"
        ))),
    }
}

/// Map a database row to a `RosterSlot`.
pub fn map_row_to_slot(row: sqlx::postgres::PgRow) -> RosterSlot {
    RosterSlot {
        slot_index: row.get("slot_index"),
        slot_id: row.get("slot_id"),
        role: row.get("role"),
        owner_id: row.get("owner_id"),
        hero_id: row.get("hero_id"),
        hero_name: row.get("hero_name"),
        ready: row.get("ready"),
        joined_at: row.get("joined_at"),
        standin: row.get("standin"),
        match_source: row.get("match_source"),
        score: row.get("score"),
        rating: row.get("rating"),
        battles: row.get("battles"),
        win_rate: row.get("win_rate"),
        status: row.get("status"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_outcome_committed() {
        let at = Utc::now();
        let outcome =
            commit_outcome_from_status("committed", 101, Some(101), Some(at), Some(3), None)
                .unwrap();
        assert_eq!(outcome.committed_version, 101);
        assert_eq!(outcome.committed_at, at);
        assert_eq!(outcome.inserted_rows, 3);
    }

    #[test]
    fn test_commit_outcome_version_conflict_carries_versions() {
        let err = commit_outcome_from_status(
            "slot_version_conflict",
            99,
            None,
            None,
            None,
            Some(100),
        )
        .unwrap_err();

        assert_eq!(err.code(), "slot_version_conflict");
        match err {
            RosterError::SlotVersionConflict { incoming, stored } => {
                assert_eq!(incoming, 99);
                assert_eq!(stored, 100);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_commit_outcome_room_not_found() {
        let err = commit_outcome_from_status("room_not_found", 100, None, None, None, None)
            .unwrap_err();
        assert_eq!(err.code(), "room_not_found");
    }

    #[test]
    fn test_commit_outcome_empty_roster() {
        let err =
            commit_outcome_from_status("empty_roster", 100, None, None, None, None).unwrap_err();
        assert_eq!(err.code(), "empty_roster");
    }

    #[test]
    fn test_commit_outcome_unknown_status() {
        let err = commit_outcome_from_status("exploded", 100, None, None, None, None).unwrap_err();
        assert_eq!(err.code(), "sync_failed");
    }
}
