//! Timeline repository: idempotent event persistence.
//!
//! Timeline rows are append-only and keyed by a deterministic `event_id`;
//! redelivery of the same logical event upserts instead of duplicating.

use crate::errors::RosterError;
use crate::models::StoredTimelineEvent;
use crate::observability::metrics;
use sqlx::PgPool;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Timeline repository for database operations.
pub struct TimelineRepository;

impl TimelineRepository {
    /// Upsert a timeline event row.
    ///
    /// Conflict key is `event_id`; a replayed event refreshes its mutable
    /// columns and leaves exactly one stored row.
    #[instrument(
        skip_all,
        name = "roster.repo.upsert_timeline_event",
        fields(session_id = %session_id, event_type = %event.event_type)
    )]
    pub async fn upsert_event(
        pool: &PgPool,
        session_id: Uuid,
        event: &StoredTimelineEvent,
    ) -> Result<(), RosterError> {
        let start = Instant::now();

        sqlx::query(
            r#"
            INSERT INTO session_timeline_events (
                event_id, session_id, event_type, owner_id, turn,
                occurred_at, reason, context, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (event_id) DO UPDATE SET
                reason = EXCLUDED.reason,
                context = EXCLUDED.context,
                metadata = EXCLUDED.metadata
            "#,
        )
        .bind(&event.event_id) // $1
        .bind(session_id) // $2
        .bind(&event.event_type) // $3
        .bind(event.owner_id) // $4
        .bind(event.turn) // $5
        .bind(event.occurred_at) // $6
        .bind(event.reason.clone()) // $7
        .bind(event.context.clone()) // $8
        .bind(event.metadata.clone()) // $9
        .execute(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("upsert_timeline_event", "error", start.elapsed());
            RosterError::Database(e.to_string())
        })?;

        metrics::record_db_query("upsert_timeline_event", "success", start.elapsed());

        Ok(())
    }
}
