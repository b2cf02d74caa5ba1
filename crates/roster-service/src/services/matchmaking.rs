//! Role/score assignment: turns a candidate queue into room assignments.
//!
//! Ranked mode fills each role greedily with queue members whose score lies
//! within a window of a reference score, retrying with progressively larger
//! windows before declaring the room not ready. Casual mode drops the score
//! constraint, fills by role and arrival order, and keeps parties in the
//! same room. The resulting assignments seed the first roster snapshot.

use crate::models::{QueueMember, RoleAssignmentView, RoleSpec, RoomAssignmentView};
use std::collections::HashMap;
use thiserror::Error;

/// Score window radii tried in increasing order when none are supplied.
pub const DEFAULT_SCORE_WINDOWS: [i32; 2] = [100, 200];

/// Matchmaking failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchmakingError {
    /// No full room could be assembled; names the roles that starved at the
    /// widest window.
    #[error("roles starved: {}", roles.join(", "))]
    RoleStarved { roles: Vec<String> },

    #[error("invalid matchmaking request: {0}")]
    InvalidRequest(String),
}

/// A matchmaking run's input.
#[derive(Debug, Clone)]
pub struct MatchPlanRequest {
    pub roles: Vec<RoleSpec>,
    pub queue: Vec<QueueMember>,
    pub score_windows: Vec<i32>,
    pub casual: bool,
    pub target_score: Option<i32>,
}

/// A matchmaking run's output: one or more fully-seated rooms.
#[derive(Debug, Clone)]
pub struct MatchPlan {
    pub rooms: Vec<RoomAssignmentView>,
}

/// Assemble as many full rooms as the queue supports.
///
/// Members are consumed in arrival order. The run fails only when not even
/// one room can be filled; a partial leftover queue after at least one full
/// room is normal.
pub fn plan_rooms(request: &MatchPlanRequest) -> Result<MatchPlan, MatchmakingError> {
    if request.roles.is_empty() {
        return Err(MatchmakingError::InvalidRequest(
            "no roles declared".to_string(),
        ));
    }
    if request.roles.iter().any(|r| r.slot_count == 0) {
        return Err(MatchmakingError::InvalidRequest(
            "role with zero slot count".to_string(),
        ));
    }

    let mut windows: Vec<i32> = request
        .score_windows
        .iter()
        .copied()
        .filter(|w| *w > 0)
        .collect();
    if windows.is_empty() {
        windows.extend(DEFAULT_SCORE_WINDOWS);
    }
    windows.sort_unstable();

    // Stable sort by arrival keeps same-instant members in submission order.
    let mut remaining: Vec<QueueMember> = request.queue.clone();
    remaining.sort_by_key(|m| m.joined_at);

    let total_slots: usize = request.roles.iter().map(|r| r.slot_count as usize).sum();

    let mut rooms = Vec::new();
    let mut last_starved: Vec<String> = Vec::new();

    while remaining.len() >= total_slots {
        let built = if request.casual {
            build_casual_room(&request.roles, &remaining)
        } else {
            build_ranked_room(&request.roles, &remaining, &windows, request.target_score)
        };

        match built {
            Ok(room) => {
                let taken: Vec<usize> = room.member_indices.clone();
                rooms.push(room);
                // Remove seated members, highest index first so the
                // remaining indices stay valid.
                let mut sorted = taken;
                sorted.sort_unstable_by(|a, b| b.cmp(a));
                for index in sorted {
                    if index < remaining.len() {
                        remaining.remove(index);
                    }
                }
            }
            Err(starved) => {
                last_starved = starved;
                break;
            }
        }
    }

    if rooms.is_empty() {
        if last_starved.is_empty() {
            last_starved = request.roles.iter().map(|r| r.name.clone()).collect();
        }
        return Err(MatchmakingError::RoleStarved {
            roles: last_starved,
        });
    }

    Ok(MatchPlan {
        rooms: rooms.into_iter().map(|r| r.view).collect(),
    })
}

/// A built room plus the queue indices it consumed.
struct BuiltRoom {
    view: RoomAssignmentView,
    member_indices: Vec<usize>,
}

/// Ranked room: score-window fill, widening the window before giving up.
fn build_ranked_room(
    roles: &[RoleSpec],
    remaining: &[QueueMember],
    windows: &[i32],
    target_score: Option<i32>,
) -> Result<BuiltRoom, Vec<String>> {
    let reference = target_score.or_else(|| remaining.first().map(|m| m.score));
    let Some(reference) = reference else {
        return Err(roles.iter().map(|r| r.name.clone()).collect());
    };

    let mut starved_at_widest: Vec<String> = Vec::new();

    for window in windows {
        match try_fill(roles, remaining, |member| {
            (member.score - reference).abs() <= *window
        }) {
            Ok((assignments, indices)) => {
                return Ok(BuiltRoom {
                    view: RoomAssignmentView {
                        reference_score: Some(reference),
                        assignments,
                    },
                    member_indices: indices,
                });
            }
            Err(starved) => starved_at_widest = starved,
        }
    }

    Err(starved_at_widest)
}

/// Casual room: role + arrival order only, parties kept together.
fn build_casual_room(
    roles: &[RoleSpec],
    remaining: &[QueueMember],
) -> Result<BuiltRoom, Vec<String>> {
    let mut need: HashMap<&str, u32> = roles
        .iter()
        .map(|r| (r.name.as_str(), r.slot_count))
        .collect();
    let mut picked: Vec<usize> = Vec::new();

    for (index, member) in remaining.iter().enumerate() {
        if picked.contains(&index) {
            continue;
        }
        if need.values().all(|n| *n == 0) {
            break;
        }

        if let Some(party_id) = member.party_id {
            // Seat the whole party or skip it for a later room.
            let party: Vec<usize> = remaining
                .iter()
                .enumerate()
                .filter(|(i, m)| m.party_id == Some(party_id) && !picked.contains(i))
                .map(|(i, _)| i)
                .collect();

            let mut trial = need.clone();
            let fits = party.iter().all(|i| {
                remaining.get(*i).is_some_and(|m| {
                    match trial.get_mut(m.role.as_str()) {
                        Some(n) if *n > 0 => {
                            *n -= 1;
                            true
                        }
                        _ => false,
                    }
                })
            });

            if fits {
                need = trial;
                picked.extend(party);
            }
        } else if let Some(n) = need.get_mut(member.role.as_str()) {
            if *n > 0 {
                *n -= 1;
                picked.push(index);
            }
        }
    }

    let starved: Vec<String> = roles
        .iter()
        .filter(|r| need.get(r.name.as_str()).copied().unwrap_or(0) > 0)
        .map(|r| r.name.clone())
        .collect();

    if !starved.is_empty() {
        return Err(starved);
    }

    Ok(BuiltRoom {
        view: RoomAssignmentView {
            reference_score: None,
            assignments: assignments_from_indices(roles, remaining, &picked),
        },
        member_indices: picked,
    })
}

/// Greedy fill of every role from members passing `eligible`, arrival order.
#[allow(clippy::type_complexity)]
fn try_fill(
    roles: &[RoleSpec],
    remaining: &[QueueMember],
    eligible: impl Fn(&QueueMember) -> bool,
) -> Result<(Vec<RoleAssignmentView>, Vec<usize>), Vec<String>> {
    let mut picked: Vec<usize> = Vec::new();
    let mut starved: Vec<String> = Vec::new();

    for role in roles {
        let mut taken = 0u32;
        for (index, member) in remaining.iter().enumerate() {
            if taken == role.slot_count {
                break;
            }
            if picked.contains(&index) {
                continue;
            }
            if member.role == role.name && eligible(member) {
                picked.push(index);
                taken += 1;
            }
        }
        if taken < role.slot_count {
            starved.push(role.name.clone());
        }
    }

    if !starved.is_empty() {
        return Err(starved);
    }

    Ok((assignments_from_indices(roles, remaining, &picked), picked))
}

/// Group picked members back into per-role assignments, role order preserved.
fn assignments_from_indices(
    roles: &[RoleSpec],
    remaining: &[QueueMember],
    picked: &[usize],
) -> Vec<RoleAssignmentView> {
    roles
        .iter()
        .map(|role| RoleAssignmentView {
            role: role.name.clone(),
            members: picked
                .iter()
                .filter_map(|i| remaining.get(*i))
                .filter(|m| m.role == role.name)
                .cloned()
                .collect(),
        })
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn roles() -> Vec<RoleSpec> {
        vec![
            RoleSpec {
                name: "tank".to_string(),
                slot_count: 1,
            },
            RoleSpec {
                name: "dps".to_string(),
                slot_count: 2,
            },
        ]
    }

    fn member(role: &str, score: i32, minutes_ago: i64) -> QueueMember {
        QueueMember {
            owner_id: Uuid::new_v4(),
            role: role.to_string(),
            score,
            joined_at: Some(Utc::now() - Duration::minutes(minutes_ago)),
            party_id: None,
        }
    }

    fn request(queue: Vec<QueueMember>) -> MatchPlanRequest {
        MatchPlanRequest {
            roles: roles(),
            queue,
            score_windows: vec![100, 200],
            casual: false,
            target_score: None,
        }
    }

    #[test]
    fn test_ranked_fills_room_within_first_window() {
        let plan = plan_rooms(&request(vec![
            member("tank", 1500, 30),
            member("dps", 1520, 20),
            member("dps", 1480, 10),
        ]))
        .unwrap();

        assert_eq!(plan.rooms.len(), 1);
        let room = &plan.rooms[0];
        assert_eq!(room.reference_score, Some(1500));
        assert_eq!(room.assignments[0].role, "tank");
        assert_eq!(room.assignments[0].members.len(), 1);
        assert_eq!(room.assignments[1].members.len(), 2);
    }

    #[test]
    fn test_ranked_widens_window_when_needed() {
        // Second dps is 150 away from the reference: outside window 100,
        // inside window 200.
        let plan = plan_rooms(&request(vec![
            member("tank", 1500, 30),
            member("dps", 1510, 20),
            member("dps", 1650, 10),
        ]))
        .unwrap();

        assert_eq!(plan.rooms.len(), 1);
        assert_eq!(plan.rooms[0].assignments[1].members.len(), 2);
    }

    #[test]
    fn test_ranked_starved_role_reported() {
        let err = plan_rooms(&request(vec![
            member("tank", 1500, 30),
            member("dps", 1510, 20),
            member("dps", 2600, 10),
        ]))
        .unwrap_err();

        match err {
            MatchmakingError::RoleStarved { roles } => assert_eq!(roles, vec!["dps".to_string()]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_ranked_uses_target_score_override() {
        let mut req = request(vec![
            member("tank", 2000, 30),
            member("dps", 2010, 20),
            member("dps", 1990, 10),
        ]);
        req.target_score = Some(2000);

        let plan = plan_rooms(&req).unwrap();
        assert_eq!(plan.rooms[0].reference_score, Some(2000));
    }

    #[test]
    fn test_ranked_builds_multiple_rooms() {
        let queue = vec![
            member("tank", 1500, 60),
            member("dps", 1510, 50),
            member("dps", 1490, 40),
            member("tank", 2500, 30),
            member("dps", 2510, 20),
            member("dps", 2490, 10),
        ];

        let plan = plan_rooms(&request(queue)).unwrap();
        assert_eq!(plan.rooms.len(), 2);
        assert_eq!(plan.rooms[0].reference_score, Some(1500));
        assert_eq!(plan.rooms[1].reference_score, Some(2500));
    }

    #[test]
    fn test_casual_ignores_scores() {
        let mut req = request(vec![
            member("tank", 100, 30),
            member("dps", 9000, 20),
            member("dps", 50, 10),
        ]);
        req.casual = true;

        let plan = plan_rooms(&req).unwrap();
        assert_eq!(plan.rooms.len(), 1);
        assert_eq!(plan.rooms[0].reference_score, None);
    }

    #[test]
    fn test_casual_keeps_party_in_same_room() {
        let party = Uuid::new_v4();
        let mut a = member("tank", 100, 30);
        a.party_id = Some(party);
        let mut b = member("dps", 200, 29);
        b.party_id = Some(party);

        let mut req = request(vec![a.clone(), b.clone(), member("dps", 300, 10)]);
        req.casual = true;

        let plan = plan_rooms(&req).unwrap();
        let room = &plan.rooms[0];
        let seated: Vec<Uuid> = room
            .assignments
            .iter()
            .flat_map(|a| a.members.iter().map(|m| m.owner_id))
            .collect();
        assert!(seated.contains(&a.owner_id));
        assert!(seated.contains(&b.owner_id));
    }

    #[test]
    fn test_casual_skips_party_that_does_not_fit() {
        // Party of two dps cannot fit a room with one dps seat left after
        // the first dps is seated; a lone dps later in the queue completes
        // the room instead.
        let party = Uuid::new_v4();
        let mut p1 = member("dps", 100, 30);
        p1.party_id = Some(party);
        let mut p2 = member("dps", 100, 29);
        p2.party_id = Some(party);
        let mut p3 = member("dps", 100, 28);
        p3.party_id = Some(party);

        let mut req = MatchPlanRequest {
            roles: roles(),
            queue: vec![
                member("tank", 100, 40),
                p1,
                p2,
                p3,
                member("dps", 100, 20),
                member("dps", 100, 10),
            ],
            score_windows: vec![],
            casual: true,
            target_score: None,
        };
        req.casual = true;

        let plan = plan_rooms(&req).unwrap();
        let room = &plan.rooms[0];
        let dps_members = &room.assignments[1].members;
        assert_eq!(dps_members.len(), 2);
        // The three-member party was skipped entirely.
        assert!(dps_members.iter().all(|m| m.party_id.is_none()));
    }

    #[test]
    fn test_empty_roles_rejected() {
        let req = MatchPlanRequest {
            roles: vec![],
            queue: vec![],
            score_windows: vec![],
            casual: false,
            target_score: None,
        };
        assert!(matches!(
            plan_rooms(&req),
            Err(MatchmakingError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_queue_smaller_than_room_is_starved() {
        let err = plan_rooms(&request(vec![member("tank", 1500, 10)])).unwrap_err();
        assert!(matches!(err, MatchmakingError::RoleStarved { .. }));
    }
}
