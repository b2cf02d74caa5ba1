//! Timeline publisher: idempotent persistence plus best-effort fan-out.
//!
//! `publish` maps a domain event to its canonical row, upserts it keyed by a
//! deterministic event id, and only then hands the batch to the fan-out
//! worker. The two fan-out paths never roll back the persisted row and
//! never fail the original request.

use crate::errors::RosterError;
use crate::models::{StoredTimelineEvent, TimelineEvent, TurnEventRow};
use crate::observability::metrics;
use crate::repositories::TimelineRepository;
use crate::tasks::{FanoutHandle, FanoutJob};
use chrono::{DateTime, Utc};
use ring::digest;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Event type recorded when a standin backfill pass patches a roster.
pub const EVENT_STANDIN_BACKFILL: &str = "standin_backfill";

/// Event type recorded when a drop-in bonus extends the turn timer.
pub const EVENT_TURN_TIMER_EXTENDED: &str = "turn_timer_extended";

/// Publishes timeline events.
#[derive(Clone)]
pub struct TimelinePublisher {
    pool: PgPool,
    fanout: FanoutHandle,
}

impl TimelinePublisher {
    pub fn new(pool: PgPool, fanout: FanoutHandle) -> Self {
        Self { pool, fanout }
    }

    /// Persist an event idempotently, then dispatch it to the fan-out
    /// worker. Returns the stored form (event id resolved).
    #[instrument(skip_all, name = "roster.timeline.publish", fields(session_id = %session_id))]
    pub async fn publish(
        &self,
        session_id: Uuid,
        event: TimelineEvent,
    ) -> Result<StoredTimelineEvent, RosterError> {
        let stored = resolve_event(event);

        TimelineRepository::upsert_event(&self.pool, session_id, &stored)
            .await
            .inspect_err(|_| metrics::record_timeline_publish("error"))?;
        metrics::record_timeline_publish("success");

        self.fanout.dispatch(FanoutJob {
            session_id,
            events: vec![stored.clone()],
        });

        Ok(stored)
    }
}

/// Resolve an event's id, deriving one when the caller supplied none.
pub fn resolve_event(event: TimelineEvent) -> StoredTimelineEvent {
    let event_id = event
        .event_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| {
            derive_event_id(
                &event.event_type,
                event.owner_id,
                event.turn,
                event.occurred_at,
            )
        });

    StoredTimelineEvent {
        event_id,
        event_type: event.event_type,
        owner_id: event.owner_id,
        turn: event.turn,
        occurred_at: event.occurred_at,
        reason: event.reason,
        context: event.context,
        metadata: event.metadata,
    }
}

/// Derive a deterministic event id for one logical occurrence.
///
/// SHA-256 over type, owner, turn and millisecond timestamp — resubmitting
/// the same occurrence always lands on the same row.
pub fn derive_event_id(
    event_type: &str,
    owner_id: Option<Uuid>,
    turn: i32,
    occurred_at: DateTime<Utc>,
) -> String {
    let owner = owner_id.map(|o| o.to_string()).unwrap_or_default();
    let seed = format!(
        "{event_type}|{owner}|{turn}|{}",
        occurred_at.timestamp_millis()
    );
    hex::encode(digest::digest(&digest::SHA256, seed.as_bytes()))
}

/// Derive the timeline event for a drop-in bonus extension, if the
/// turn-state extras indicate one was just applied.
///
/// This is a best-effort side channel of the meta upsert: callers log and
/// swallow publish failures.
pub fn drop_in_bonus_event(session_id: Uuid, turn_event: &TurnEventRow) -> Option<TimelineEvent> {
    let extras = &turn_event.extras;

    let applied = extras
        .get("drop_in_bonus_applied")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    let bonus_seconds = extras
        .get("drop_in_bonus_seconds")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);

    if !applied && bonus_seconds <= 0 {
        return None;
    }

    Some(TimelineEvent {
        event_id: None,
        event_type: EVENT_TURN_TIMER_EXTENDED.to_string(),
        owner_id: turn_event.emitter_id,
        turn: turn_event.turn_number,
        occurred_at: turn_event.created_at,
        reason: Some("drop_in_bonus".to_string()),
        context: Some(session_id.to_string()),
        metadata: serde_json::json!({
            "bonus_seconds": bonus_seconds,
            "source": turn_event.source,
        }),
    })
}
