//! Candidate pool: eligible standins near a target score within a role.
//!
//! `CandidateSource` is the seam the standin selector works against; the
//! Postgres implementation calls the `fetch_candidate_pool` store function.
//! Selection policy (random pick, tolerance widening) lives in the selector,
//! not here — the pool only filters and orders.

use crate::errors::RosterError;
use crate::models::Candidate;
use crate::observability::metrics;
use crate::repositories::map_store_error;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// One candidate-pool query.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub game_id: Uuid,

    /// Role filter; `None` drops the filter entirely (last-resort fallback).
    pub role: Option<String>,

    /// Seat score the pool is centered on.
    pub score: i32,

    /// Maximum |candidate.score - seat.score|.
    pub tolerance: i32,

    /// Owners that already hold a seat; never returned.
    pub exclude_owners: Vec<Uuid>,

    /// Maximum pool size.
    pub limit: i64,
}

/// Source of standin candidates.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Fetch up to `query.limit` candidates matching the query, ordered by
    /// closeness to `query.score`.
    async fn fetch_candidates(&self, query: &CandidateQuery)
        -> Result<Vec<Candidate>, RosterError>;
}

/// Postgres-backed candidate pool.
#[derive(Clone)]
pub struct PgCandidatePool {
    pool: PgPool,
}

impl PgCandidatePool {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandidateSource for PgCandidatePool {
    #[instrument(skip_all, name = "roster.repo.fetch_candidates", fields(tolerance = query.tolerance))]
    async fn fetch_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<Candidate>, RosterError> {
        let start = Instant::now();

        let rows = sqlx::query(
            r#"
            SELECT owner_id, hero_id, role, score, rating, battles, win_rate
            FROM fetch_candidate_pool($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(query.game_id) // $1
        .bind(query.role.clone()) // $2
        .bind(query.score) // $3
        .bind(query.tolerance) // $4
        .bind(query.exclude_owners.clone()) // $5
        .bind(query.limit) // $6
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("fetch_candidate_pool", "error", start.elapsed());
            match map_store_error("fetch_candidate_pool", e) {
                missing @ RosterError::MissingStoreFunction(_) => missing,
                RosterError::Database(message) => RosterError::RpcFailed(message),
                other => other,
            }
        })?;

        metrics::record_db_query("fetch_candidate_pool", "success", start.elapsed());

        Ok(rows
            .into_iter()
            .map(|row| Candidate {
                owner_id: row.get("owner_id"),
                hero_id: row.get("hero_id"),
                role: row.get("role"),
                score: row.get("score"),
                rating: row.get("rating"),
                battles: row.get("battles"),
                win_rate: row.get("win_rate"),
            })
            .collect())
    }
}

/// Batch-resolve hero display names for a set of hero ids.
///
/// One query for all seats of a backfill pass, never one per seat.
#[instrument(skip_all, name = "roster.repo.hero_summaries")]
pub async fn hero_summaries(
    pool: &PgPool,
    hero_ids: &[i64],
) -> Result<HashMap<i64, String>, RosterError> {
    if hero_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let start = Instant::now();

    let rows = sqlx::query("SELECT hero_id, hero_name FROM heroes WHERE hero_id = ANY($1)")
        .bind(hero_ids)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("hero_summaries", "error", start.elapsed());
            RosterError::Database(e.to_string())
        })?;

    metrics::record_db_query("hero_summaries", "success", start.elapsed());

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<i64, _>("hero_id"), row.get::<String, _>("hero_name")))
        .collect())
}
