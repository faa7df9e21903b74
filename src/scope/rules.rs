use crate::auth::{ActorContext, RoleTier};

/// Capability names that widen visibility independent of role
pub const LEVEL_1: &str = "level 1";
pub const LEVEL_2: &str = "level 2";
pub const LEVEL_3: &str = "level 3";
pub const LEVEL_4: &str = "level 4";

/// Which `level N` capabilities the actor holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Levels {
    pub level1: bool,
    pub level2: bool,
    pub level3: bool,
    pub level4: bool,
}

pub struct ScopeInput<'a> {
    pub actor: &'a ActorContext,
    pub levels: Levels,
}

/// What a matched rule grants, before directory lookups are resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    Unrestricted,
    Brand(i64),
    ManagedBrands,
    Region(i64),
    Branch(i64),
    /// `None` when an agent-tier actor has no agent record; matches nothing
    Agent(Option<i64>),
    Owner,
}

pub struct ScopeRule {
    pub name: &'static str,
    pub guard: fn(&ScopeInput) -> bool,
    pub grant: fn(&ScopeInput) -> Grant,
}

fn is_region_tier(tier: RoleTier) -> bool {
    matches!(tier, RoleTier::Region(_))
}

fn is_branch_tier(tier: RoleTier) -> bool {
    matches!(tier, RoleTier::Branch(_))
}

const ADMIN: ScopeRule = ScopeRule {
    name: "admin",
    guard: |i| i.actor.role_tier.is_admin() || i.levels.level1,
    grant: |_| Grant::Unrestricted,
};

const COMPANY: ScopeRule = ScopeRule {
    name: "company",
    guard: |i| i.actor.role_tier == RoleTier::Company,
    grant: |i| Grant::Brand(i.actor.id),
};

const MANAGED_BRANDS: ScopeRule = ScopeRule {
    name: "managed-brands",
    guard: |i| is_region_tier(i.actor.role_tier) || i.levels.level2,
    grant: |_| Grant::ManagedBrands,
};

const REGION: ScopeRule = ScopeRule {
    name: "region",
    guard: |i| {
        (i.actor.role_tier == RoleTier::RegionManager || i.levels.level3) && i.actor.region_id.is_some()
    },
    grant: |i| i.actor.region_id.map(Grant::Region).unwrap_or(Grant::Owner),
};

const BRANCH: ScopeRule = ScopeRule {
    name: "branch",
    guard: |i| (is_branch_tier(i.actor.role_tier) || i.levels.level4) && i.actor.branch_id.is_some(),
    grant: |i| i.actor.branch_id.map(Grant::Branch).unwrap_or(Grant::Owner),
};

const AGENT: ScopeRule = ScopeRule {
    name: "agent",
    guard: |i| i.actor.role_tier == RoleTier::Agent,
    grant: |i| Grant::Agent(i.actor.agent_id),
};

const OWNER: ScopeRule = ScopeRule {
    name: "owner",
    guard: |_| true,
    grant: |_| Grant::Owner,
};

/// First match wins. The last rule always matches.
pub static RECORD_RULES: &[ScopeRule] = &[ADMIN, COMPANY, MANAGED_BRANDS, REGION, BRANCH, AGENT, OWNER];

/// Same shape for note listings; agents only see their own notes.
pub static NOTE_RULES: &[ScopeRule] = &[ADMIN, COMPANY, MANAGED_BRANDS, REGION, BRANCH, OWNER];

static FALLBACK: ScopeRule = OWNER;

pub fn fallback_rule(rules: &'static [ScopeRule]) -> &'static ScopeRule {
    rules.last().unwrap_or(&FALLBACK)
}

pub fn select_rule(input: &ScopeInput, rules: &'static [ScopeRule]) -> &'static ScopeRule {
    rules
        .iter()
        .find(|rule| (rule.guard)(input))
        .unwrap_or_else(|| fallback_rule(rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{BranchRole, RegionRole};

    fn pick(actor: &ActorContext, levels: Levels) -> &'static str {
        select_rule(&ScopeInput { actor, levels }, RECORD_RULES).name
    }

    #[test]
    fn admins_are_unrestricted_regardless_of_attributes() {
        let actor = ActorContext::new(1, RoleTier::SuperAdmin).with_branch(3);
        assert_eq!(pick(&actor, Levels::default()), "admin");
        let actor = ActorContext::new(2, RoleTier::AdminTeam);
        assert_eq!(pick(&actor, Levels::default()), "admin");
    }

    #[test]
    fn level_one_beats_every_tier() {
        let actor = ActorContext::new(7, RoleTier::Agent).with_agent(4);
        let levels = Levels { level1: true, ..Levels::default() };
        assert_eq!(pick(&actor, levels), "admin");
    }

    #[test]
    fn tiers_are_checked_in_order() {
        let pd = ActorContext::new(3, RoleTier::Region(RegionRole::ProjectDirector)).with_branch(9);
        assert_eq!(pick(&pd, Levels::default()), "managed-brands");

        let bm = ActorContext::new(4, RoleTier::Branch(BranchRole::BranchManager)).with_branch(12);
        assert_eq!(pick(&bm, Levels::default()), "branch");

        let company = ActorContext::new(5, RoleTier::Company);
        assert_eq!(pick(&company, Levels::default()), "company");
    }

    #[test]
    fn missing_attribute_falls_through_to_owner() {
        let rm = ActorContext::new(6, RoleTier::RegionManager);
        assert_eq!(pick(&rm, Levels::default()), "owner");

        let officer = ActorContext::new(8, RoleTier::Branch(BranchRole::AdmissionsOfficer));
        assert_eq!(pick(&officer, Levels::default()), "owner");
    }

    #[test]
    fn region_manager_without_region_but_with_level_four_branch() {
        let actor = ActorContext::new(6, RoleTier::RegionManager).with_branch(2);
        let levels = Levels { level4: true, ..Levels::default() };
        assert_eq!(pick(&actor, levels), "branch");
    }

    #[test]
    fn note_chain_has_no_agent_rule() {
        let actor = ActorContext::new(9, RoleTier::Agent).with_agent(1);
        let rule = select_rule(&ScopeInput { actor: &actor, levels: Levels::default() }, NOTE_RULES);
        assert_eq!(rule.name, "owner");
    }
}
