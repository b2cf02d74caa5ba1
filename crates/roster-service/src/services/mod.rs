//! Service layer for the roster engine.
//!
//! # Components
//!
//! - `matchmaking` - role/score assignment feeding the first roster snapshot
//! - `standin` - standin selection and placeholder synthesis for missed
//!   readiness deadlines
//! - `access` - ordered session authorization policy
//! - `timeline` - idempotent timeline publishing with best-effort fan-out

pub mod access;
pub mod matchmaking;
pub mod standin;
pub mod timeline;

pub use access::{AccessContext, AccessPolicy, GrantDecision, SessionGrant};
pub use matchmaking::{plan_rooms, MatchPlan, MatchPlanRequest, MatchmakingError};
pub use standin::{fill_vacant_seats, merge_fills_into_roster, BackfillOutcome, VacantSeat};
pub use timeline::TimelinePublisher;
