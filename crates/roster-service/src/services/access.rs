//! Ordered session authorization policy.
//!
//! The five grant paths are independent predicates evaluated in order until
//! one allows; a caller no path allows is forbidden. New grant paths slot
//! into the list without re-threading control flow:
//!
//! 1. session owner
//! 2. member of the room's match roster for the session's room
//! 3. occupant of a room slot whose room matches the session's owner/game
//! 4. member of the match roster by instance with matching game
//! 5. listed collaborator who is also a ranked participant of the game

use crate::errors::RosterError;
use crate::models::SessionRow;
use crate::repositories::{RostersRepository, SessionsRepository};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// Outcome of one grant check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantDecision {
    /// The caller is authorized; stop evaluating.
    Allow,

    /// This path does not apply; try the next one.
    Continue,
}

/// Everything a grant may consult about the request.
#[derive(Debug, Clone)]
pub struct AccessContext {
    pub caller: Uuid,
    pub session: SessionRow,

    /// Instance declared by the caller, if any; falls back to the session's.
    pub declared_match_instance_id: Option<Uuid>,

    /// Collaborators listed in the request body.
    pub collaborators: Vec<Uuid>,
}

impl AccessContext {
    fn match_instance_id(&self) -> Option<Uuid> {
        self.declared_match_instance_id
            .or(self.session.match_instance_id)
    }
}

/// One authorization grant path.
#[async_trait]
pub trait SessionGrant: Send + Sync {
    /// Stable name, used in logs when the grant allows.
    fn name(&self) -> &'static str;

    async fn check(&self, ctx: &AccessContext) -> Result<GrantDecision, RosterError>;
}

/// Ordered list of grant paths.
pub struct AccessPolicy {
    grants: Vec<Box<dyn SessionGrant>>,
}

impl AccessPolicy {
    /// Build a policy from an explicit grant list (tests, custom orders).
    pub fn from_grants(grants: Vec<Box<dyn SessionGrant>>) -> Self {
        Self { grants }
    }

    /// The standard five-path policy. Order matters: cheap identity checks
    /// run before store lookups.
    pub fn standard(pool: PgPool) -> Self {
        Self::from_grants(vec![
            Box::new(SessionOwnerGrant),
            Box::new(RoomRosterMemberGrant { pool: pool.clone() }),
            Box::new(RoomSlotOccupantGrant { pool: pool.clone() }),
            Box::new(InstanceRosterMemberGrant { pool: pool.clone() }),
            Box::new(CollaboratorGrant { pool }),
        ])
    }

    /// Evaluate grants in order; returns the name of the allowing grant.
    pub async fn authorize(&self, ctx: &AccessContext) -> Result<&'static str, RosterError> {
        for grant in &self.grants {
            match grant.check(ctx).await? {
                GrantDecision::Allow => {
                    tracing::debug!(
                        target: "roster.services.access",
                        grant = grant.name(),
                        session_id = %ctx.session.session_id,
                        "Caller authorized"
                    );
                    return Ok(grant.name());
                }
                GrantDecision::Continue => {}
            }
        }

        tracing::warn!(
            target: "roster.services.access",
            session_id = %ctx.session.session_id,
            "Caller matched no authorization grant"
        );
        Err(RosterError::Forbidden(
            "Caller is not authorized for this session".to_string(),
        ))
    }
}

// ============================================================================
// Grant implementations
// ============================================================================

/// Path 1: the caller owns the session.
pub struct SessionOwnerGrant;

#[async_trait]
impl SessionGrant for SessionOwnerGrant {
    fn name(&self) -> &'static str {
        "session_owner"
    }

    async fn check(&self, ctx: &AccessContext) -> Result<GrantDecision, RosterError> {
        if ctx.caller == ctx.session.owner_id {
            Ok(GrantDecision::Allow)
        } else {
            Ok(GrantDecision::Continue)
        }
    }
}

/// Path 2: the caller holds a seat in the session room's newest roster.
pub struct RoomRosterMemberGrant {
    pub pool: PgPool,
}

#[async_trait]
impl SessionGrant for RoomRosterMemberGrant {
    fn name(&self) -> &'static str {
        "room_roster_member"
    }

    async fn check(&self, ctx: &AccessContext) -> Result<GrantDecision, RosterError> {
        if RostersRepository::is_roster_member(&self.pool, ctx.session.room_id, ctx.caller).await? {
            Ok(GrantDecision::Allow)
        } else {
            Ok(GrantDecision::Continue)
        }
    }
}

/// Path 3: the caller occupies a room slot of a room matching the session's
/// owner and game.
pub struct RoomSlotOccupantGrant {
    pub pool: PgPool,
}

#[async_trait]
impl SessionGrant for RoomSlotOccupantGrant {
    fn name(&self) -> &'static str {
        "room_slot_occupant"
    }

    async fn check(&self, ctx: &AccessContext) -> Result<GrantDecision, RosterError> {
        let occupant = SessionsRepository::is_room_slot_occupant(
            &self.pool,
            ctx.caller,
            ctx.session.owner_id,
            ctx.session.game_id,
        )
        .await?;

        if occupant {
            Ok(GrantDecision::Allow)
        } else {
            Ok(GrantDecision::Continue)
        }
    }
}

/// Path 4: the caller appears in the match roster of the instance with a
/// matching game.
pub struct InstanceRosterMemberGrant {
    pub pool: PgPool,
}

#[async_trait]
impl SessionGrant for InstanceRosterMemberGrant {
    fn name(&self) -> &'static str {
        "instance_roster_member"
    }

    async fn check(&self, ctx: &AccessContext) -> Result<GrantDecision, RosterError> {
        let Some(match_instance_id) = ctx.match_instance_id() else {
            return Ok(GrantDecision::Continue);
        };

        let member = SessionsRepository::is_instance_roster_member(
            &self.pool,
            match_instance_id,
            ctx.session.game_id,
            ctx.caller,
        )
        .await?;

        if member {
            Ok(GrantDecision::Allow)
        } else {
            Ok(GrantDecision::Continue)
        }
    }
}

/// Path 5: the caller is listed as a collaborator AND is a ranked
/// participant of the session's game.
pub struct CollaboratorGrant {
    pub pool: PgPool,
}

#[async_trait]
impl SessionGrant for CollaboratorGrant {
    fn name(&self) -> &'static str {
        "collaborator"
    }

    async fn check(&self, ctx: &AccessContext) -> Result<GrantDecision, RosterError> {
        if !ctx.collaborators.contains(&ctx.caller) {
            return Ok(GrantDecision::Continue);
        }

        let participant =
            SessionsRepository::is_rank_participant(&self.pool, ctx.session.game_id, ctx.caller)
                .await?;

        if participant {
            Ok(GrantDecision::Allow)
        } else {
            Ok(GrantDecision::Continue)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::RealtimeMode;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn session(owner: Uuid) -> SessionRow {
        SessionRow {
            session_id: Uuid::new_v4(),
            owner_id: owner,
            room_id: Uuid::new_v4(),
            game_id: Uuid::new_v4(),
            match_instance_id: None,
            selected_time_limit_seconds: Some(90),
            time_vote: None,
            drop_in_bonus_seconds: 0,
            turn_state: None,
            async_fill_snapshot: None,
            realtime_mode: RealtimeMode::Off,
            updated_at: Utc::now(),
        }
    }

    fn context(caller: Uuid, session_owner: Uuid) -> AccessContext {
        AccessContext {
            caller,
            session: session(session_owner),
            declared_match_instance_id: None,
            collaborators: vec![],
        }
    }

    /// Stub grant with a scripted decision and a call counter.
    struct StubGrant {
        name: &'static str,
        decision: GrantDecision,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SessionGrant for StubGrant {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn check(&self, _ctx: &AccessContext) -> Result<GrantDecision, RosterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.decision)
        }
    }

    fn stub(
        name: &'static str,
        decision: GrantDecision,
    ) -> (Box<dyn SessionGrant>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(StubGrant {
                name,
                decision,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn test_session_owner_grant_allows_owner() {
        let owner = Uuid::new_v4();
        let ctx = context(owner, owner);
        assert_eq!(
            SessionOwnerGrant.check(&ctx).await.unwrap(),
            GrantDecision::Allow
        );
    }

    #[tokio::test]
    async fn test_session_owner_grant_continues_for_other_caller() {
        let ctx = context(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            SessionOwnerGrant.check(&ctx).await.unwrap(),
            GrantDecision::Continue
        );
    }

    #[tokio::test]
    async fn test_policy_stops_at_first_allow() {
        let (first, first_calls) = stub("first", GrantDecision::Continue);
        let (second, second_calls) = stub("second", GrantDecision::Allow);
        let (third, third_calls) = stub("third", GrantDecision::Allow);

        let policy = AccessPolicy::from_grants(vec![first, second, third]);
        let ctx = context(Uuid::new_v4(), Uuid::new_v4());

        let granted = policy.authorize(&ctx).await.unwrap();

        assert_eq!(granted, "second");
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_policy_forbidden_when_all_continue() {
        let (first, _) = stub("first", GrantDecision::Continue);
        let (second, _) = stub("second", GrantDecision::Continue);

        let policy = AccessPolicy::from_grants(vec![first, second]);
        let ctx = context(Uuid::new_v4(), Uuid::new_v4());

        let err = policy.authorize(&ctx).await.unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }

    #[tokio::test]
    async fn test_policy_empty_grant_list_is_forbidden() {
        let policy = AccessPolicy::from_grants(vec![]);
        let ctx = context(Uuid::new_v4(), Uuid::new_v4());

        let err = policy.authorize(&ctx).await.unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }

    #[tokio::test]
    async fn test_collaborator_grant_requires_listing() {
        // A caller absent from the collaborator list continues without ever
        // touching the participant lookup (no pool in this stub context, so
        // reaching it would error the test).
        let pool_less = CollaboratorGrant {
            pool: PgPool::connect_lazy("postgresql://localhost/unused").unwrap(),
        };
        let ctx = context(Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(
            pool_less.check(&ctx).await.unwrap(),
            GrantDecision::Continue
        );
    }

    #[test]
    fn test_context_prefers_declared_instance() {
        let declared = Uuid::new_v4();
        let mut ctx = context(Uuid::new_v4(), Uuid::new_v4());
        ctx.session.match_instance_id = Some(Uuid::new_v4());
        ctx.declared_match_instance_id = Some(declared);

        assert_eq!(ctx.match_instance_id(), Some(declared));
    }
}
