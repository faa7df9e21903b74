use serde::{Deserialize, Serialize};

/// JWT claims issued by the session service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i64,
    /// Role string as stored on the user (`users.type`)
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<i64>,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionRole {
    ProjectDirector,
    ProjectManager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchRole {
    BranchManager,
    AdmissionsOfficer,
    CareerConsultant,
    AdmissionsManager,
    MarketingOfficer,
}

/// Coarse role bucket, in scoping priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleTier {
    SuperAdmin,
    AdminTeam,
    Company,
    Region(RegionRole),
    RegionManager,
    Branch(BranchRole),
    Agent,
    Default,
}

impl RoleTier {
    /// Map a `users.type` value onto a tier. Unknown strings land on `Default`.
    pub fn from_role_name(name: &str) -> Self {
        match name.trim() {
            "super admin" => RoleTier::SuperAdmin,
            "Admin Team" => RoleTier::AdminTeam,
            "company" => RoleTier::Company,
            "Project Director" => RoleTier::Region(RegionRole::ProjectDirector),
            "Project Manager" => RoleTier::Region(RegionRole::ProjectManager),
            "Region Manager" => RoleTier::RegionManager,
            "Branch Manager" => RoleTier::Branch(BranchRole::BranchManager),
            "Admissions Officer" => RoleTier::Branch(BranchRole::AdmissionsOfficer),
            // both spellings exist in user records
            "Career Consultant" | "Careers Consultant" => RoleTier::Branch(BranchRole::CareerConsultant),
            "Admissions Manager" => RoleTier::Branch(BranchRole::AdmissionsManager),
            "Marketing Officer" => RoleTier::Branch(BranchRole::MarketingOfficer),
            "Agent" => RoleTier::Agent,
            _ => RoleTier::Default,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, RoleTier::SuperAdmin | RoleTier::AdminTeam)
    }
}

/// Resolved identity of the caller. Built once per request by the auth middleware.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorContext {
    pub id: i64,
    pub role_tier: RoleTier,
    pub brand_id: Option<i64>,
    pub region_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub agent_id: Option<i64>,
}

impl ActorContext {
    pub fn new(id: i64, role_tier: RoleTier) -> Self {
        Self {
            id,
            role_tier,
            brand_id: None,
            region_id: None,
            branch_id: None,
            agent_id: None,
        }
    }

    pub fn with_brand(mut self, brand_id: i64) -> Self {
        self.brand_id = Some(brand_id);
        self
    }

    pub fn with_region(mut self, region_id: i64) -> Self {
        self.region_id = Some(region_id);
        self
    }

    pub fn with_branch(mut self, branch_id: i64) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn with_agent(mut self, agent_id: i64) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Build from token claims with an already-resolved tier
    pub fn from_claims(claims: &Claims, role_tier: RoleTier) -> Self {
        Self {
            id: claims.sub,
            role_tier,
            brand_id: claims.brand_id,
            region_id: claims.region_id,
            branch_id: claims.branch_id,
            agent_id: claims.agent_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_role_names() {
        assert_eq!(RoleTier::from_role_name("super admin"), RoleTier::SuperAdmin);
        assert_eq!(RoleTier::from_role_name("company"), RoleTier::Company);
        assert_eq!(
            RoleTier::from_role_name("Project Manager"),
            RoleTier::Region(RegionRole::ProjectManager)
        );
        assert_eq!(
            RoleTier::from_role_name("Careers Consultant"),
            RoleTier::Branch(BranchRole::CareerConsultant)
        );
        assert_eq!(RoleTier::from_role_name("client"), RoleTier::Default);
    }
}
