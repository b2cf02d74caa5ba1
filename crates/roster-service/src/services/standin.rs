//! Standin selection for seats whose occupant missed the ready deadline.
//!
//! For each vacant seat the selector queries the candidate pool at a strict
//! score tolerance, widens the tolerance a bounded number of times, and
//! drops the role filter entirely as a last resort. Among the surviving
//! pool it picks uniformly at random — spreading load across eligible
//! standins instead of always taking the closest score. A seat that still
//! has no candidate receives a synthesized placeholder, so no seat is ever
//! left null after a pass.

use crate::errors::RosterError;
use crate::models::{
    BackfillDiagnostics, Candidate, RosterSlot, MATCH_SOURCE_PLACEHOLDER, MATCH_SOURCE_STANDIN,
    SLOT_STATUS_STANDIN,
};
use crate::repositories::{CandidateQuery, CandidateSource};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Initial score tolerance for the candidate pool query.
pub const BASE_SCORE_TOLERANCE: i32 = 50;

/// Tolerance multiplier per expansion step.
pub const TOLERANCE_GROWTH_FACTOR: i32 = 2;

/// Maximum number of tolerance expansions per seat.
pub const MAX_TOLERANCE_EXPANSIONS: u32 = 4;

/// Maximum candidate pool size per query.
pub const CANDIDATE_POOL_LIMIT: i64 = 16;

/// Descriptor of one seat awaiting a standin.
#[derive(Debug, Clone)]
pub struct VacantSeat {
    pub slot_index: i32,
    pub role: String,
    pub score: i32,
    pub rating: i32,
}

impl VacantSeat {
    /// Build a seat descriptor from the vacant roster row.
    pub fn from_slot(slot: &RosterSlot) -> Self {
        Self {
            slot_index: slot.slot_index,
            role: slot.role.clone(),
            score: slot.score,
            rating: slot.rating,
        }
    }
}

/// One filled seat.
#[derive(Debug, Clone)]
pub struct SeatFill {
    pub slot_index: i32,
    pub candidate: Candidate,

    /// Tolerance in effect when the candidate was found (placeholders carry
    /// the widest tolerance tried).
    pub tolerance: i32,

    pub placeholder: bool,
}

/// Result of one backfill pass.
#[derive(Debug, Clone)]
pub struct BackfillOutcome {
    pub fills: Vec<SeatFill>,
    pub placeholders: u32,
    pub diagnostics: BackfillDiagnostics,
}

/// Fill every vacant seat with a candidate or a placeholder.
///
/// `seated_owners` holds owners already present in the roster; candidates
/// matching them are excluded, and each real pick joins the set so no owner
/// is seated twice within the pass.
pub async fn fill_vacant_seats<S, R>(
    source: &S,
    game_id: Uuid,
    seats: &[VacantSeat],
    seated_owners: &mut HashSet<Uuid>,
    rng: &mut R,
) -> Result<BackfillOutcome, RosterError>
where
    S: CandidateSource + ?Sized,
    R: Rng,
{
    let mut diagnostics = BackfillDiagnostics {
        requested_seats: seats.len() as u32,
        ..BackfillDiagnostics::default()
    };
    let mut fills = Vec::with_capacity(seats.len());
    let mut placeholders = 0u32;

    for seat in seats {
        let fill = fill_one_seat(source, game_id, seat, seated_owners, rng, &mut diagnostics)
            .await?;

        if fill.placeholder {
            placeholders += 1;
        } else if let Some(owner) = fill.candidate.owner_id {
            seated_owners.insert(owner);
        }

        fills.push(fill);
    }

    Ok(BackfillOutcome {
        fills,
        placeholders,
        diagnostics,
    })
}

/// Fill a single seat: strict tolerance, widen, drop role, placeholder.
async fn fill_one_seat<S, R>(
    source: &S,
    game_id: Uuid,
    seat: &VacantSeat,
    seated_owners: &HashSet<Uuid>,
    rng: &mut R,
    diagnostics: &mut BackfillDiagnostics,
) -> Result<SeatFill, RosterError>
where
    S: CandidateSource + ?Sized,
    R: Rng,
{
    let exclude: Vec<Uuid> = seated_owners.iter().copied().collect();
    let mut tolerance = BASE_SCORE_TOLERANCE;

    for expansion in 0..=MAX_TOLERANCE_EXPANSIONS {
        if expansion > 0 {
            tolerance *= TOLERANCE_GROWTH_FACTOR;
            diagnostics.score_tolerance_expansions += 1;
        }
        diagnostics.score_tolerance_max = diagnostics.score_tolerance_max.max(tolerance);

        let pool = query_pool(
            source,
            game_id,
            seat,
            Some(seat.role.clone()),
            tolerance,
            &exclude,
            diagnostics,
        )
        .await?;

        if let Some(candidate) = pick_uniform(&pool, rng, diagnostics) {
            return Ok(SeatFill {
                slot_index: seat.slot_index,
                candidate,
                tolerance,
                placeholder: false,
            });
        }
    }

    // Last resort: drop the role filter entirely, one extra query.
    diagnostics.role_fallbacks += 1;
    let pool = query_pool(source, game_id, seat, None, tolerance, &exclude, diagnostics).await?;

    if let Some(candidate) = pick_uniform(&pool, rng, diagnostics) {
        return Ok(SeatFill {
            slot_index: seat.slot_index,
            candidate,
            tolerance,
            placeholder: false,
        });
    }

    Ok(SeatFill {
        slot_index: seat.slot_index,
        candidate: placeholder_candidate(seat),
        tolerance,
        placeholder: true,
    })
}

async fn query_pool<S>(
    source: &S,
    game_id: Uuid,
    seat: &VacantSeat,
    role: Option<String>,
    tolerance: i32,
    exclude: &[Uuid],
    diagnostics: &mut BackfillDiagnostics,
) -> Result<Vec<Candidate>, RosterError>
where
    S: CandidateSource + ?Sized,
{
    diagnostics.rpc_calls += 1;
    source
        .fetch_candidates(&CandidateQuery {
            game_id,
            role,
            score: seat.score,
            tolerance,
            exclude_owners: exclude.to_vec(),
            limit: CANDIDATE_POOL_LIMIT,
        })
        .await
}

/// Uniform random pick among the pool.
///
/// Deliberately NOT nearest-score: uniform choice spreads standin load
/// across eligible candidates.
fn pick_uniform<R: Rng>(
    pool: &[Candidate],
    rng: &mut R,
    diagnostics: &mut BackfillDiagnostics,
) -> Option<Candidate> {
    if pool.len() > 1 {
        diagnostics.randomized_assignments += 1;
    }
    pool.choose(rng).cloned()
}

/// Synthesize a placeholder occupant for a seat with no candidates.
fn placeholder_candidate(seat: &VacantSeat) -> Candidate {
    Candidate {
        owner_id: None,
        hero_id: None,
        role: seat.role.clone(),
        score: seat.score,
        rating: seat.rating,
        battles: 0,
        win_rate: 0.0,
    }
}

/// Merge seat fills back into the full roster.
///
/// Untouched seats pass through unchanged; filled seats keep their index,
/// id and role and take the candidate's identity. Hero names come from the
/// batch-resolved summary map; placeholders get a generated label.
pub fn merge_fills_into_roster(
    roster: &[RosterSlot],
    fills: &[SeatFill],
    hero_names: &HashMap<i64, String>,
    now: DateTime<Utc>,
) -> Vec<RosterSlot> {
    let by_index: HashMap<i32, &SeatFill> =
        fills.iter().map(|f| (f.slot_index, f)).collect();

    roster
        .iter()
        .map(|slot| {
            let Some(fill) = by_index.get(&slot.slot_index) else {
                return slot.clone();
            };

            let candidate = &fill.candidate;
            let hero_name = if fill.placeholder {
                format!("Standby #{}", slot.slot_index + 1)
            } else {
                candidate
                    .hero_id
                    .and_then(|id| hero_names.get(&id).cloned())
                    .unwrap_or_default()
            };

            RosterSlot {
                slot_index: slot.slot_index,
                slot_id: slot.slot_id,
                role: slot.role.clone(),
                owner_id: candidate.owner_id,
                hero_id: candidate.hero_id,
                hero_name,
                ready: true,
                joined_at: now,
                standin: true,
                match_source: if fill.placeholder {
                    MATCH_SOURCE_PLACEHOLDER.to_string()
                } else {
                    MATCH_SOURCE_STANDIN.to_string()
                },
                score: candidate.score,
                rating: candidate.rating,
                battles: candidate.battles,
                win_rate: candidate.win_rate,
                status: SLOT_STATUS_STANDIN.to_string(),
            }
        })
        .collect()
}
