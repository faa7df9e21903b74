use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::{ActorContext, RoleTier};

#[derive(Debug, Error, Clone)]
pub enum ScopeError {
    #[error("permission service unavailable: {0}")]
    Unavailable(String),
}

/// Answers capability questions about an actor.
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    async fn can(&self, actor_id: i64, capability: &str) -> Result<bool, ScopeError>;

    async fn role_tier(&self, actor_id: i64) -> Result<RoleTier, ScopeError>;
}

/// Organisational lookups the scoping rules depend on.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Brands the actor may manage (project directors/managers, `level 2` holders)
    async fn managed_brand_ids(&self, actor: &ActorContext) -> Result<Vec<i64>, ScopeError>;
}

/// In-process oracle fed from a fixed table. Backs `--memory` mode and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissionOracle {
    tiers: HashMap<i64, RoleTier>,
    capabilities: HashMap<i64, HashSet<String>>,
    offline: bool,
}

impl StaticPermissionOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tier(mut self, actor_id: i64, tier: RoleTier) -> Self {
        self.tiers.insert(actor_id, tier);
        self
    }

    pub fn grant(mut self, actor_id: i64, capability: &str) -> Self {
        self.capabilities
            .entry(actor_id)
            .or_default()
            .insert(capability.to_string());
        self
    }

    /// Every call fails, to exercise fail-closed paths
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl PermissionOracle for StaticPermissionOracle {
    async fn can(&self, actor_id: i64, capability: &str) -> Result<bool, ScopeError> {
        if self.offline {
            return Err(ScopeError::Unavailable("static oracle is offline".to_string()));
        }
        Ok(self
            .capabilities
            .get(&actor_id)
            .map(|caps| caps.contains(capability))
            .unwrap_or(false))
    }

    async fn role_tier(&self, actor_id: i64) -> Result<RoleTier, ScopeError> {
        if self.offline {
            return Err(ScopeError::Unavailable("static oracle is offline".to_string()));
        }
        Ok(self.tiers.get(&actor_id).copied().unwrap_or(RoleTier::Default))
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    managed_brands: HashMap<i64, Vec<i64>>,
    offline: bool,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_managed_brands(mut self, actor_id: i64, brands: Vec<i64>) -> Self {
        self.managed_brands.insert(actor_id, brands);
        self
    }

    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn managed_brand_ids(&self, actor: &ActorContext) -> Result<Vec<i64>, ScopeError> {
        if self.offline {
            return Err(ScopeError::Unavailable("static directory is offline".to_string()));
        }
        Ok(self.managed_brands.get(&actor.id).cloned().unwrap_or_default())
    }
}
