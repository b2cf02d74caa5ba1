//! HTTP handlers for the roster service.
//!
//! - `health` - liveness/readiness probes
//! - `metrics` - Prometheus exposition
//! - `stage` - POST /api/v1/stage-room-match
//! - `ready_timeout` - POST /api/v1/ready-timeout
//! - `session_meta` - POST /api/v1/session-meta
//! - `matchmake` - POST /api/v1/matchmake

pub mod health;
pub mod matchmake;
pub mod metrics;
pub mod ready_timeout;
pub mod session_meta;
pub mod stage;

pub use health::{health_check, readiness_check};
pub use matchmake::matchmake;
pub use metrics::metrics_handler;
pub use ready_timeout::ready_timeout;
pub use session_meta::session_meta;
pub use stage::stage_room_match;
