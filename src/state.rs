use std::sync::Arc;

use crate::activity::ActivityLog;
use crate::auth::{ActorContext, RoleTier};
use crate::database::RecordStore;
use crate::error::ApiError;
use crate::scope::{Directory, PermissionOracle, ScopeColumns, ScopeEngine, ScopePredicate};

/// Collaborators shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub oracle: Arc<dyn PermissionOracle>,
    pub directory: Arc<dyn Directory>,
    pub activity: Arc<dyn ActivityLog>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        oracle: Arc<dyn PermissionOracle>,
        directory: Arc<dyn Directory>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self { store, oracle, directory, activity }
    }

    pub fn scope_engine(&self) -> ScopeEngine<'_> {
        ScopeEngine::new(self.oracle.as_ref(), self.directory.as_ref())
    }

    pub async fn record_scope(&self, actor: &ActorContext, columns: &ScopeColumns) -> ScopePredicate {
        self.scope_engine().compute_scope(actor, columns).await
    }

    pub async fn note_scope(&self, actor: &ActorContext) -> ScopePredicate {
        self.scope_engine().compute_note_scope(actor).await
    }

    /// Passes when the actor is in one of `tiers` or holds any of
    /// `capabilities`; otherwise 403.
    pub async fn authorize(
        &self,
        actor: &ActorContext,
        tiers: &[RoleTier],
        capabilities: &[&str],
    ) -> Result<(), ApiError> {
        if tiers.contains(&actor.role_tier) {
            return Ok(());
        }
        for capability in capabilities {
            match self.oracle.can(actor.id, capability).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("permission check for user {} failed, denying: {}", actor.id, e);
                    return Err(ApiError::permission_denied());
                }
            }
        }
        tracing::debug!(
            "user {} denied; needs one of {:?} or {:?}",
            actor.id,
            tiers,
            capabilities
        );
        Err(ApiError::permission_denied())
    }
}
