//! Backing-store repositories.
//!
//! The engine treats the store through a small RPC-shaped contract:
//! `sync_match_roster`, `assert_room_ready`, `ensure_rank_session_for_room`,
//! and `fetch_candidate_pool` are store functions; everything else is plain
//! parameterized SQL. All mutual exclusion lives in the store, so every
//! mutation here is a single atomic call.

pub mod candidates;
pub mod rosters;
pub mod sessions;
pub mod timeline;

pub use candidates::{CandidateQuery, CandidateSource, PgCandidatePool};
pub use rosters::{CommitOutcome, CommitRequest, RostersRepository};
pub use sessions::SessionsRepository;
pub use timeline::TimelineRepository;

use crate::errors::RosterError;

/// SQLSTATE for `undefined_function` — the store function is not installed.
const UNDEFINED_FUNCTION: &str = "42883";

/// Map a store-function call error.
///
/// An `undefined_function` SQLSTATE means the deployment is missing the
/// function itself — a configuration failure surfaced as
/// `missing_<fn-name>` so operators can tell it apart from user errors.
pub(crate) fn map_store_error(function: &'static str, err: sqlx::Error) -> RosterError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNDEFINED_FUNCTION) {
            return RosterError::MissingStoreFunction(function);
        }
    }
    RosterError::Database(err.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_map_store_error_plain_io_error() {
        let err = map_store_error("sync_match_roster", sqlx::Error::PoolTimedOut);
        assert_eq!(err.code(), "database_error");
    }
}
