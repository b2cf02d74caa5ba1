//! Bounded audit trail of standin backfill passes.
//!
//! The trail is a fixed-capacity ring buffer owned by `AppState` and passed
//! by handle; when full, the oldest record is evicted. It exists so an
//! operator inspecting a misbehaving room can see the recent backfill
//! history without trawling logs.

use crate::models::BackfillDiagnostics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

/// One recorded backfill pass.
#[derive(Debug, Clone, Serialize)]
pub struct BackfillRecord {
    pub room_id: Uuid,
    pub match_instance_id: Uuid,
    pub requested_seats: u32,
    pub placeholders: u32,
    pub diagnostics: BackfillDiagnostics,
    pub recorded_at: DateTime<Utc>,
}

/// Fixed-capacity ring buffer of backfill records.
pub struct BackfillTrail {
    entries: Mutex<VecDeque<BackfillRecord>>,
    capacity: usize,
}

impl BackfillTrail {
    /// Create a trail with the given capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a record, evicting the oldest when at capacity.
    pub fn record(&self, record: BackfillRecord) {
        match self.entries.lock() {
            Ok(mut entries) => {
                if entries.len() == self.capacity {
                    entries.pop_front();
                }
                entries.push_back(record);
            }
            Err(poisoned) => {
                // A panicking writer cannot corrupt a VecDeque push; recover.
                let mut entries = poisoned.into_inner();
                if entries.len() == self.capacity {
                    entries.pop_front();
                }
                entries.push_back(record);
            }
        }
    }

    /// Most recent records, newest last, at most `limit`.
    pub fn recent(&self, limit: usize) -> Vec<BackfillRecord> {
        match self.entries.lock() {
            Ok(entries) => entries
                .iter()
                .rev()
                .take(limit)
                .cloned()
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .rev()
                .take(limit)
                .cloned()
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect(),
        }
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn record(seats: u32) -> BackfillRecord {
        BackfillRecord {
            room_id: Uuid::new_v4(),
            match_instance_id: Uuid::new_v4(),
            requested_seats: seats,
            placeholders: 0,
            diagnostics: BackfillDiagnostics::default(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_and_recent() {
        let trail = BackfillTrail::new(8);
        trail.record(record(1));
        trail.record(record(2));

        let recent = trail.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].requested_seats, 1);
        assert_eq!(recent[1].requested_seats, 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let trail = BackfillTrail::new(3);
        for seats in 1..=5 {
            trail.record(record(seats));
        }

        assert_eq!(trail.len(), 3);
        let recent = trail.recent(10);
        let seats: Vec<u32> = recent.iter().map(|r| r.requested_seats).collect();
        assert_eq!(seats, vec![3, 4, 5]);
    }

    #[test]
    fn test_recent_limit() {
        let trail = BackfillTrail::new(8);
        for seats in 1..=5 {
            trail.record(record(seats));
        }

        let recent = trail.recent(2);
        let seats: Vec<u32> = recent.iter().map(|r| r.requested_seats).collect();
        assert_eq!(seats, vec![4, 5]);
    }

    #[test]
    fn test_zero_capacity_clamped_to_one() {
        let trail = BackfillTrail::new(0);
        trail.record(record(1));
        trail.record(record(2));
        assert_eq!(trail.len(), 1);
        assert_eq!(trail.recent(10)[0].requested_seats, 2);
    }
}
