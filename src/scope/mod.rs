//! Visibility scoping: which rows of a listing an actor may see.
//!
//! The scope is derived from the actor and the permission oracle alone. Request
//! filters never widen or replace it; they are conjoined with it by `ListQuery`.

pub mod oracle;
pub mod postgres;
pub mod predicate;
pub mod rules;

pub use oracle::{Directory, PermissionOracle, ScopeError, StaticDirectory, StaticPermissionOracle};
pub use postgres::{PgDirectory, PgPermissionOracle};
pub use predicate::ScopePredicate;
pub use rules::{Grant, Levels, ScopeInput, ScopeRule, NOTE_RULES, RECORD_RULES};

use crate::auth::ActorContext;

/// Columns a record type exposes to the scoping rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeColumns {
    pub brand: &'static str,
    pub region: &'static str,
    pub branch: &'static str,
    pub agent: &'static str,
    /// `assigned_to` where the record has one, `created_by` otherwise
    pub owner: &'static str,
}

impl ScopeColumns {
    pub const DEALS: ScopeColumns = ScopeColumns {
        brand: "brand_id",
        region: "region_id",
        branch: "branch_id",
        agent: "agent_id",
        owner: "assigned_to",
    };

    /// Employees, as matched by the note chain
    pub const USERS: ScopeColumns = ScopeColumns {
        brand: "brand_id",
        region: "region_id",
        branch: "branch_id",
        agent: "agent_id",
        owner: "id",
    };

    pub const fn owned_by(owner: &'static str) -> ScopeColumns {
        ScopeColumns { owner, ..Self::DEALS }
    }
}

/// Per-request scope computation. Holds no state between calls.
pub struct ScopeEngine<'a> {
    oracle: &'a dyn PermissionOracle,
    directory: &'a dyn Directory,
}

impl<'a> ScopeEngine<'a> {
    pub fn new(oracle: &'a dyn PermissionOracle, directory: &'a dyn Directory) -> Self {
        Self { oracle, directory }
    }

    pub async fn compute_scope(&self, actor: &ActorContext, columns: &ScopeColumns) -> ScopePredicate {
        let owner = ScopePredicate::eq(columns.owner, actor.id);
        let grant = match self.grant(actor, RECORD_RULES).await {
            Some(grant) => grant,
            None => return owner,
        };
        match self.resolve(actor, grant, columns).await {
            Ok(predicate) => predicate,
            Err(e) => {
                tracing::warn!("scope lookup failed for user {}, falling back to own records: {}", actor.id, e);
                owner
            }
        }
    }

    /// Note listings: the author must be an employee the actor could see,
    /// or the actor themself.
    pub async fn compute_note_scope(&self, actor: &ActorContext) -> ScopePredicate {
        let own = ScopePredicate::eq("created_by", actor.id);
        let grant = match self.grant(actor, NOTE_RULES).await {
            Some(grant) => grant,
            None => return own,
        };
        match grant {
            Grant::Unrestricted => ScopePredicate::Unrestricted,
            Grant::Owner | Grant::Agent(_) => own,
            grant => match self.resolve(actor, grant, &ScopeColumns::USERS).await {
                Ok(users) => ScopePredicate::employees("created_by", users),
                Err(e) => {
                    tracing::warn!("note scope lookup failed for user {}, falling back to own notes: {}", actor.id, e);
                    own
                }
            },
        }
    }

    /// `None` when the oracle cannot answer; callers fail closed.
    async fn grant(&self, actor: &ActorContext, rules: &'static [ScopeRule]) -> Option<Grant> {
        let levels = match self.levels(actor.id).await {
            Ok(levels) => levels,
            Err(e) => {
                tracing::warn!("permission oracle unavailable for user {}, failing closed: {}", actor.id, e);
                return None;
            }
        };
        let input = ScopeInput { actor, levels };
        let rule = rules::select_rule(&input, rules);
        tracing::debug!("user {} ({:?}) matched scope rule '{}'", actor.id, actor.role_tier, rule.name);
        Some((rule.grant)(&input))
    }

    async fn levels(&self, actor_id: i64) -> Result<Levels, ScopeError> {
        Ok(Levels {
            level1: self.oracle.can(actor_id, rules::LEVEL_1).await?,
            level2: self.oracle.can(actor_id, rules::LEVEL_2).await?,
            level3: self.oracle.can(actor_id, rules::LEVEL_3).await?,
            level4: self.oracle.can(actor_id, rules::LEVEL_4).await?,
        })
    }

    async fn resolve(
        &self,
        actor: &ActorContext,
        grant: Grant,
        columns: &ScopeColumns,
    ) -> Result<ScopePredicate, ScopeError> {
        Ok(match grant {
            Grant::Unrestricted => ScopePredicate::Unrestricted,
            Grant::Brand(id) => ScopePredicate::eq(columns.brand, id),
            Grant::ManagedBrands => {
                let brands = self.directory.managed_brand_ids(actor).await?;
                ScopePredicate::in_list(columns.brand, brands)
            }
            Grant::Region(id) => ScopePredicate::eq(columns.region, id),
            Grant::Branch(id) => ScopePredicate::eq(columns.branch, id),
            Grant::Agent(Some(id)) => ScopePredicate::eq(columns.agent, id),
            Grant::Agent(None) => ScopePredicate::nothing(columns.agent),
            Grant::Owner => ScopePredicate::eq(columns.owner, actor.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{BranchRole, RegionRole, RoleTier};

    async fn scope_of(actor: &ActorContext, oracle: &StaticPermissionOracle, directory: &StaticDirectory) -> ScopePredicate {
        ScopeEngine::new(oracle, directory)
            .compute_scope(actor, &ScopeColumns::DEALS)
            .await
    }

    #[tokio::test]
    async fn super_admin_is_unrestricted() {
        let actor = ActorContext::new(1, RoleTier::SuperAdmin).with_branch(5);
        let scope = scope_of(&actor, &StaticPermissionOracle::new(), &StaticDirectory::new()).await;
        assert_eq!(scope, ScopePredicate::Unrestricted);
    }

    #[tokio::test]
    async fn company_sees_its_own_brand() {
        let actor = ActorContext::new(40, RoleTier::Company);
        let scope = scope_of(&actor, &StaticPermissionOracle::new(), &StaticDirectory::new()).await;
        assert_eq!(scope, ScopePredicate::eq("brand_id", 40));
    }

    #[tokio::test]
    async fn project_director_sees_managed_brands() {
        let actor = ActorContext::new(3, RoleTier::Region(RegionRole::ProjectDirector));
        let directory = StaticDirectory::new().with_managed_brands(3, vec![40, 41]);
        let scope = scope_of(&actor, &StaticPermissionOracle::new(), &directory).await;
        assert_eq!(scope, ScopePredicate::in_list("brand_id", vec![40, 41]));
    }

    #[tokio::test]
    async fn level_three_grants_region() {
        let actor = ActorContext::new(11, RoleTier::Default).with_region(2);
        let oracle = StaticPermissionOracle::new().grant(11, "level 3");
        let scope = scope_of(&actor, &oracle, &StaticDirectory::new()).await;
        assert_eq!(scope, ScopePredicate::eq("region_id", 2));
    }

    #[tokio::test]
    async fn region_manager_without_region_falls_through() {
        let actor = ActorContext::new(21, RoleTier::RegionManager);
        let scope = scope_of(&actor, &StaticPermissionOracle::new(), &StaticDirectory::new()).await;
        assert_eq!(scope, ScopePredicate::eq("assigned_to", 21));

        let placed = actor.with_region(6);
        let scope = scope_of(&placed, &StaticPermissionOracle::new(), &StaticDirectory::new()).await;
        assert_eq!(scope, ScopePredicate::eq("region_id", 6));
    }

    #[tokio::test]
    async fn branch_manager_without_branch_falls_back_to_assignment() {
        let actor = ActorContext::new(12, RoleTier::Branch(BranchRole::BranchManager));
        let scope = scope_of(&actor, &StaticPermissionOracle::new(), &StaticDirectory::new()).await;
        assert_eq!(scope, ScopePredicate::eq("assigned_to", 12));
    }

    #[tokio::test]
    async fn agent_without_agent_record_sees_nothing() {
        let actor = ActorContext::new(13, RoleTier::Agent);
        let scope = scope_of(&actor, &StaticPermissionOracle::new(), &StaticDirectory::new()).await;
        assert_eq!(scope, ScopePredicate::nothing("agent_id"));
    }

    #[tokio::test]
    async fn record_types_without_assignment_use_creator() {
        let actor = ActorContext::new(14, RoleTier::Default);
        let engine_oracle = StaticPermissionOracle::new();
        let directory = StaticDirectory::new();
        let scope = ScopeEngine::new(&engine_oracle, &directory)
            .compute_scope(&actor, &ScopeColumns::owned_by("created_by"))
            .await;
        assert_eq!(scope, ScopePredicate::eq("created_by", 14));
    }

    #[tokio::test]
    async fn oracle_failure_fails_closed() {
        let actor = ActorContext::new(1, RoleTier::SuperAdmin);
        let scope = scope_of(&actor, &StaticPermissionOracle::offline(), &StaticDirectory::new()).await;
        assert_eq!(scope, ScopePredicate::eq("assigned_to", 1));
    }

    #[tokio::test]
    async fn directory_failure_fails_closed() {
        let actor = ActorContext::new(3, RoleTier::Region(RegionRole::ProjectManager));
        let scope = scope_of(&actor, &StaticPermissionOracle::new(), &StaticDirectory::offline()).await;
        assert_eq!(scope, ScopePredicate::eq("assigned_to", 3));
    }

    #[tokio::test]
    async fn scope_is_deterministic() {
        let actor = ActorContext::new(4, RoleTier::Branch(BranchRole::AdmissionsManager)).with_branch(12);
        let oracle = StaticPermissionOracle::new();
        let directory = StaticDirectory::new();
        let first = scope_of(&actor, &oracle, &directory).await;
        let second = scope_of(&actor, &oracle, &directory).await;
        assert_eq!(first, second);
        assert_eq!(first, ScopePredicate::eq("branch_id", 12));
    }

    #[tokio::test]
    async fn note_scope_wraps_employees() {
        let oracle = StaticPermissionOracle::new();
        let directory = StaticDirectory::new();
        let engine = ScopeEngine::new(&oracle, &directory);

        let bm = ActorContext::new(4, RoleTier::Branch(BranchRole::BranchManager)).with_branch(12);
        assert_eq!(
            engine.compute_note_scope(&bm).await,
            ScopePredicate::employees("created_by", ScopePredicate::eq("branch_id", 12))
        );

        let admin = ActorContext::new(1, RoleTier::AdminTeam);
        assert_eq!(engine.compute_note_scope(&admin).await, ScopePredicate::Unrestricted);

        let agent = ActorContext::new(9, RoleTier::Agent).with_agent(2);
        assert_eq!(engine.compute_note_scope(&agent).await, ScopePredicate::eq("created_by", 9));
    }
}
