//! Roster service models.
//!
//! Domain types (roles, roster slots, candidates, sessions, timeline events)
//! plus the tagged request/response structures for the HTTP surface. Every
//! payload shape is an explicit struct validated at the boundary; handlers
//! never probe loosely-typed JSON.

use crate::errors::RosterError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Match source recorded on slots filled by a real standin candidate.
pub const MATCH_SOURCE_STANDIN: &str = "ready_timeout_standin";

/// Match source recorded on slots filled by a synthesized placeholder.
pub const MATCH_SOURCE_PLACEHOLDER: &str = "backfill_placeholder";

/// Match source recorded on slots staged by the lobby itself.
pub const MATCH_SOURCE_LOBBY: &str = "lobby_stage";

/// Status recorded on slots occupied by a standin (real or placeholder).
pub const SLOT_STATUS_STANDIN: &str = "standin";

// ============================================================================
// Domain Types
// ============================================================================

/// A role with a fixed number of seats, static per game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    /// Role name (e.g. "tank", "dps").
    pub name: String,

    /// Number of seats this role contributes to the room.
    pub slot_count: u32,
}

/// A prospective occupant pulled from the participant pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Owning player; `None` only for synthesized placeholders.
    pub owner_id: Option<Uuid>,

    /// Selected hero, if the candidate has one on record.
    pub hero_id: Option<i64>,

    /// Role the candidate queues for.
    pub role: String,

    pub score: i32,
    pub rating: i32,
    pub battles: i32,
    pub win_rate: f64,
}

/// One seat in a committed roster snapshot.
///
/// `slot_index` is immutable once the seat exists; `owner_id` is unique
/// across non-null seats within one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterSlot {
    /// Stable 0-based seat position.
    pub slot_index: i32,

    /// Stable seat identifier.
    pub slot_id: Uuid,

    pub role: String,
    pub owner_id: Option<Uuid>,
    pub hero_id: Option<i64>,
    pub hero_name: String,
    pub ready: bool,
    pub joined_at: DateTime<Utc>,

    /// True when the seat is occupied by an automated standin.
    pub standin: bool,

    /// Provenance of the occupant (lobby stage, standin backfill, ...).
    pub match_source: String,

    pub score: i32,
    pub rating: i32,
    pub battles: i32,
    pub win_rate: f64,
    pub status: String,
}

/// A member of the matchmaking queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMember {
    pub owner_id: Uuid,
    pub role: String,

    #[serde(default)]
    pub score: i32,

    /// Arrival time; members are seated in arrival order within a role.
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,

    /// Party membership; parties must land in the same room (casual mode).
    #[serde(default)]
    pub party_id: Option<Uuid>,
}

/// Realtime delivery mode for a session.
///
/// Unknown strings fall back to `Off` rather than rejecting the patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeMode {
    #[default]
    Off,
    Standard,
    Pulse,
}

impl RealtimeMode {
    /// Parse a mode string; anything unrecognized is `Off`.
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "standard" => RealtimeMode::Standard,
            "pulse" => RealtimeMode::Pulse,
            _ => RealtimeMode::Off,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RealtimeMode::Off => "off",
            RealtimeMode::Standard => "standard",
            RealtimeMode::Pulse => "pulse",
        }
    }
}

/// Session row as stored in the backing store.
///
/// Created once per session by the ensure call and only updated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub session_id: Uuid,
    pub owner_id: Uuid,
    pub room_id: Uuid,
    pub game_id: Uuid,
    pub match_instance_id: Option<Uuid>,
    pub selected_time_limit_seconds: Option<i32>,
    pub time_vote: Option<serde_json::Value>,
    pub drop_in_bonus_seconds: i32,
    pub turn_state: Option<String>,
    pub async_fill_snapshot: Option<serde_json::Value>,
    pub realtime_mode: RealtimeMode,
    pub updated_at: DateTime<Utc>,
}

/// A timeline event before persistence.
///
/// `event_id` is derived deterministically when absent, so redelivery of the
/// same logical occurrence upserts rather than duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    pub event_type: String,
    pub owner_id: Option<Uuid>,
    pub turn: i32,
    pub occurred_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A timeline event as persisted (event id resolved).
#[derive(Debug, Clone, Serialize)]
pub struct StoredTimelineEvent {
    pub event_id: String,
    pub event_type: String,
    pub owner_id: Option<Uuid>,
    pub turn: i32,
    pub occurred_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub context: Option<String>,
    pub metadata: serde_json::Value,
}

/// Diagnostics for one standin backfill pass.
///
/// Field names follow the wire contract of the `ready-timeout` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillDiagnostics {
    pub requested_seats: u32,
    pub rpc_calls: u32,
    pub role_fallbacks: u32,
    pub score_tolerance_expansions: u32,
    pub score_tolerance_max: i32,
    pub randomized_assignments: u32,
}

// ============================================================================
// Probe Responses
// ============================================================================

/// Readiness probe response for `/ready`.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Service readiness status ("ready" or "not_ready").
    pub status: &'static str,

    /// Database connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,

    /// Error message (generic, no infrastructure details).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// stage-room-match
// ============================================================================

/// A roster seat as submitted by the lobby client.
///
/// Optional fields receive defaults during normalization; `slot_index` and
/// `role` are the only hard requirements per seat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterSlotPayload {
    pub slot_index: i32,

    #[serde(default)]
    pub slot_id: Option<Uuid>,

    pub role: String,

    #[serde(default)]
    pub owner_id: Option<Uuid>,

    #[serde(default)]
    pub hero_id: Option<i64>,

    #[serde(default)]
    pub hero_name: Option<String>,

    #[serde(default)]
    pub ready: bool,

    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub standin: bool,

    #[serde(default)]
    pub match_source: Option<String>,

    #[serde(default)]
    pub score: i32,

    #[serde(default)]
    pub rating: i32,

    #[serde(default)]
    pub battles: i32,

    #[serde(default)]
    pub win_rate: f64,

    #[serde(default)]
    pub status: Option<String>,
}

impl RosterSlotPayload {
    /// Normalize into a full `RosterSlot`, resolving hero names from the
    /// submitted hero map and stamping defaults.
    pub fn into_slot(self, hero_map: &HashMap<String, String>, now: DateTime<Utc>) -> RosterSlot {
        let hero_name = self
            .hero_name
            .filter(|name| !name.is_empty())
            .or_else(|| {
                self.hero_id
                    .and_then(|id| hero_map.get(&id.to_string()).cloned())
            })
            .unwrap_or_default();

        let status = self.status.filter(|s| !s.is_empty()).unwrap_or_else(|| {
            if self.owner_id.is_some() {
                "claimed".to_string()
            } else {
                "open".to_string()
            }
        });

        RosterSlot {
            slot_index: self.slot_index,
            slot_id: self.slot_id.unwrap_or_else(Uuid::new_v4),
            role: self.role,
            owner_id: self.owner_id,
            hero_id: self.hero_id,
            hero_name,
            ready: self.ready,
            joined_at: self.joined_at.unwrap_or(now),
            standin: self.standin,
            match_source: self
                .match_source
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| MATCH_SOURCE_LOBBY.to_string()),
            score: self.score,
            rating: self.rating,
            battles: self.battles,
            win_rate: self.win_rate,
            status,
        }
    }
}

/// Slot template descriptor for a staged roster generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotTemplatePayload {
    /// Monotonic snapshot version, typically epoch milliseconds.
    pub version: i64,

    pub source: String,
    pub updated_at: DateTime<Utc>,
    pub roles: Vec<RoleSpec>,
}

/// Request body for `POST /api/v1/stage-room-match`.
#[derive(Debug, Clone, Deserialize)]
pub struct StageRoomMatchRequest {
    pub match_instance_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub game_id: Option<Uuid>,

    #[serde(default)]
    pub roster: Vec<RosterSlotPayload>,

    /// Hero id (stringified) to display name, resolved client-side.
    #[serde(default)]
    pub hero_map: HashMap<String, String>,

    pub slot_template: Option<SlotTemplatePayload>,

    #[serde(default)]
    pub allow_partial: bool,

    #[serde(default)]
    pub async_fill_meta: Option<serde_json::Value>,

    #[serde(default)]
    pub ready_vote: Option<serde_json::Value>,
}

impl StageRoomMatchRequest {
    /// Validate required fields and roles/slots consistency.
    pub fn validate(&self) -> Result<(), RosterError> {
        self.match_instance_id
            .ok_or(RosterError::MissingField("match_instance_id"))?;
        self.room_id.ok_or(RosterError::MissingField("room_id"))?;
        self.game_id.ok_or(RosterError::MissingField("game_id"))?;
        let template = self
            .slot_template
            .as_ref()
            .ok_or(RosterError::MissingField("slot_template"))?;

        if self.roster.is_empty() {
            return Err(RosterError::EmptyRoster);
        }

        validate_roles_and_slots(&template.roles, &self.roster)
    }
}

/// Check the roles/slots invariants of a staged roster.
///
/// Total seats must equal Σ slot_count; seat indices are unique and in
/// range; every seat's role is declared; non-null owners are unique.
pub fn validate_roles_and_slots(
    roles: &[RoleSpec],
    slots: &[RosterSlotPayload],
) -> Result<(), RosterError> {
    if roles.is_empty() {
        return Err(RosterError::RolesSlotsInvalid(
            "template declares no roles".to_string(),
        ));
    }

    if roles.iter().any(|r| r.slot_count == 0) {
        return Err(RosterError::RolesSlotsInvalid(
            "role with zero slot count".to_string(),
        ));
    }

    let total_slots: u32 = roles.iter().map(|r| r.slot_count).sum();
    if total_slots as usize != slots.len() {
        return Err(RosterError::RolesSlotsInvalid(format!(
            "template declares {total_slots} seats but roster has {}",
            slots.len()
        )));
    }

    let role_names: HashSet<&str> = roles.iter().map(|r| r.name.as_str()).collect();
    let mut seen_indices = HashSet::new();
    let mut seen_owners = HashSet::new();

    for slot in slots {
        if slot.slot_index < 0 || slot.slot_index as u32 >= total_slots {
            return Err(RosterError::RolesSlotsInvalid(format!(
                "slot index {} out of range",
                slot.slot_index
            )));
        }
        if !seen_indices.insert(slot.slot_index) {
            return Err(RosterError::RolesSlotsInvalid(format!(
                "duplicate slot index {}",
                slot.slot_index
            )));
        }
        if !role_names.contains(slot.role.as_str()) {
            return Err(RosterError::RolesSlotsInvalid(format!(
                "seat role `{}` is not declared by the template",
                slot.role
            )));
        }
        if let Some(owner) = slot.owner_id {
            if !seen_owners.insert(owner) {
                return Err(RosterError::RolesSlotsInvalid(format!(
                    "owner {owner} occupies more than one seat"
                )));
            }
        }
    }

    Ok(())
}

/// Response body for `POST /api/v1/stage-room-match`.
#[derive(Debug, Clone, Serialize)]
pub struct StageRoomMatchResponse {
    pub ok: bool,

    /// Number of roster rows committed.
    pub staged: i64,

    pub slot_template_version: i64,
    pub slot_template_updated_at: DateTime<Utc>,
    pub session_id: Uuid,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_vote: Option<serde_json::Value>,
}

// ============================================================================
// ready-timeout
// ============================================================================

/// Request body for `POST /api/v1/ready-timeout`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyTimeoutRequest {
    pub match_instance_id: Option<Uuid>,
    pub game_id: Option<Uuid>,
    pub room_id: Option<Uuid>,

    #[serde(default)]
    pub missing_owner_ids: Vec<Uuid>,
}

impl ReadyTimeoutRequest {
    pub fn validate(&self) -> Result<(), RosterError> {
        self.match_instance_id
            .ok_or(RosterError::MissingField("match_instance_id"))?;
        self.game_id.ok_or(RosterError::MissingField("game_id"))?;
        self.room_id.ok_or(RosterError::MissingField("room_id"))?;
        Ok(())
    }
}

/// One filled seat in the `ready-timeout` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatAssignmentView {
    pub slot_index: i32,
    pub owner_id: Option<Uuid>,
    pub hero_id: Option<i64>,

    /// Score tolerance in effect when the candidate was found.
    pub tolerance: i32,
}

/// Response body for `POST /api/v1/ready-timeout`.
#[derive(Debug, Clone, Serialize)]
pub struct ReadyTimeoutResponse {
    pub updated: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub assignments: Vec<SeatAssignmentView>,

    /// Number of seats that received a synthesized placeholder.
    pub placeholders: u32,

    pub diagnostics: BackfillDiagnostics,
}

// ============================================================================
// session-meta
// ============================================================================

/// Partial session meta patch; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionMetaPatch {
    pub selected_time_limit_seconds: Option<i32>,
    pub time_vote: Option<serde_json::Value>,
    pub drop_in_bonus_seconds: Option<i32>,
    pub turn_state: Option<String>,
    pub async_fill_snapshot: Option<serde_json::Value>,
    pub realtime_mode: Option<String>,
}

/// A sanitized session meta patch, safe to hand to the store.
#[derive(Debug, Clone, Default)]
pub struct SanitizedMetaPatch {
    pub selected_time_limit_seconds: Option<i32>,
    pub time_vote: Option<serde_json::Value>,
    pub drop_in_bonus_seconds: Option<i32>,
    pub turn_state: Option<String>,
    pub async_fill_snapshot: Option<serde_json::Value>,
    pub realtime_mode: Option<RealtimeMode>,
}

impl SessionMetaPatch {
    /// Sanitize the patch: non-positive time limits and negative bonuses are
    /// dropped; unknown realtime mode strings fall back to `off`.
    pub fn sanitize(self) -> SanitizedMetaPatch {
        SanitizedMetaPatch {
            selected_time_limit_seconds: self.selected_time_limit_seconds.filter(|v| *v > 0),
            time_vote: self.time_vote,
            drop_in_bonus_seconds: self.drop_in_bonus_seconds.filter(|v| *v >= 0),
            turn_state: self.turn_state,
            async_fill_snapshot: self.async_fill_snapshot,
            realtime_mode: self
                .realtime_mode
                .map(|mode| RealtimeMode::parse_lenient(&mode)),
        }
    }
}

/// Turn-state event submitted alongside a session meta patch.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnStatePayload {
    /// Explicit turn number; the store sequences the next turn when absent.
    pub turn_number: Option<i32>,

    pub emitter_id: Option<Uuid>,
    pub source: Option<String>,

    #[serde(default)]
    pub extras: serde_json::Value,
}

/// A sequenced turn-state event as persisted.
#[derive(Debug, Clone, Serialize)]
pub struct TurnEventRow {
    pub session_id: Uuid,
    pub turn_number: i32,
    pub emitter_id: Option<Uuid>,
    pub source: Option<String>,
    pub extras: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /api/v1/session-meta`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionMetaRequest {
    pub session_id: Option<Uuid>,
    pub game_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub match_instance_id: Option<Uuid>,

    #[serde(default)]
    pub collaborators: Vec<Uuid>,

    #[serde(default)]
    pub meta: Option<SessionMetaPatch>,

    #[serde(default)]
    pub turn_state_event: Option<TurnStatePayload>,
}

impl SessionMetaRequest {
    pub fn validate(&self) -> Result<(), RosterError> {
        self.session_id
            .ok_or(RosterError::MissingField("session_id"))?;
        Ok(())
    }
}

/// Response body for `POST /api/v1/session-meta`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetaResponse {
    pub ok: bool,
    pub meta: SessionRow,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<TurnEventRow>,

    #[serde(rename = "timelineEvent", skip_serializing_if = "Option::is_none")]
    pub timeline_event: Option<StoredTimelineEvent>,
}

// ============================================================================
// matchmake
// ============================================================================

/// Request body for `POST /api/v1/matchmake`.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchmakeRequest {
    pub roles: Option<Vec<RoleSpec>>,

    #[serde(default)]
    pub queue: Vec<QueueMember>,

    /// Score window radii tried in increasing order.
    #[serde(default)]
    pub score_windows: Vec<i32>,

    #[serde(default)]
    pub casual: bool,

    /// Reference score override; defaults to the first unmatched member.
    #[serde(default)]
    pub target_score: Option<i32>,
}

/// One role→members assignment within a room.
#[derive(Debug, Clone, Serialize)]
pub struct RoleAssignmentView {
    pub role: String,
    pub members: Vec<QueueMember>,
}

/// One assembled room.
#[derive(Debug, Clone, Serialize)]
pub struct RoomAssignmentView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_score: Option<i32>,

    pub assignments: Vec<RoleAssignmentView>,
}

/// Response body for `POST /api/v1/matchmake`.
#[derive(Debug, Clone, Serialize)]
pub struct MatchmakeResponse {
    pub ready: bool,
    pub rooms: Vec<RoomAssignmentView>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub starved_roles: Vec<String>,
}
