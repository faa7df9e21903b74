use async_trait::async_trait;
use sqlx::PgPool;

use super::oracle::{Directory, PermissionOracle, ScopeError};
use crate::auth::{ActorContext, RoleTier};

/// Permissions granted directly or through a role (`model_has_permissions`,
/// `model_has_roles` joined to `role_has_permissions`).
pub struct PgPermissionOracle {
    pool: PgPool,
}

impl PgPermissionOracle {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionOracle for PgPermissionOracle {
    async fn can(&self, actor_id: i64, capability: &str) -> Result<bool, ScopeError> {
        let granted: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM permissions p
                WHERE p.name = $2 AND (
                    p.id IN (SELECT permission_id FROM model_has_permissions WHERE model_id = $1)
                    OR p.id IN (
                        SELECT rhp.permission_id FROM role_has_permissions rhp
                        JOIN model_has_roles mhr ON mhr.role_id = rhp.role_id
                        WHERE mhr.model_id = $1
                    )
                )
            )",
        )
        .bind(actor_id)
        .bind(capability)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ScopeError::Unavailable(e.to_string()))?;
        Ok(granted)
    }

    async fn role_tier(&self, actor_id: i64) -> Result<RoleTier, ScopeError> {
        let role: Option<String> = sqlx::query_scalar("SELECT type FROM users WHERE id = $1")
            .bind(actor_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ScopeError::Unavailable(e.to_string()))?;
        Ok(role
            .map(|r| RoleTier::from_role_name(&r))
            .unwrap_or(RoleTier::Default))
    }
}

/// Brands are users of type `company`; a brand is managed by its project
/// director and project manager.
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn managed_brand_ids(&self, actor: &ActorContext) -> Result<Vec<i64>, ScopeError> {
        let mut ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM users
             WHERE type = 'company' AND (project_director_id = $1 OR project_manager_id = $1)
             ORDER BY id",
        )
        .bind(actor.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ScopeError::Unavailable(e.to_string()))?;

        if let Some(brand) = actor.brand_id {
            if !ids.contains(&brand) {
                ids.push(brand);
            }
        }
        Ok(ids)
    }
}
