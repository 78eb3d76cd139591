use crate::shared::schema::workspace_members;
use crate::shared::utils::DbPool;
use crate::store::StoreError;
use async_trait::async_trait;
use diesel::prelude::*;
use uuid::Uuid;

/// Tenant boundary check. Errors fail closed: the resolver treats any store
/// failure here as a denial, never as membership.
#[async_trait]
pub trait WorkspaceGuard: Send + Sync {
    async fn is_member(&self, user_id: Uuid, workspace_id: Uuid) -> Result<bool, StoreError>;
}

pub struct PgWorkspaceGuard {
    pool: DbPool,
}

impl PgWorkspaceGuard {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkspaceGuard for PgWorkspaceGuard {
    async fn is_member(&self, user_id: Uuid, workspace_id: Uuid) -> Result<bool, StoreError> {
        let pool = self.pool.clone();
        let count: i64 = tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            workspace_members::table
                .filter(workspace_members::workspace_id.eq(workspace_id))
                .filter(workspace_members::user_id.eq(user_id))
                .count()
                .get_result(&mut conn)
                .map_err(|e| StoreError::Unavailable(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(count > 0)
    }
}
