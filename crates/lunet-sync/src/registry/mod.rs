//! Identity registry collaborator.

mod memory;
mod sql;

use std::sync::Arc;

use async_trait::async_trait;
use lunet_core::ActiveIdentity;

use crate::error::SyncError;

pub use memory::MemoryRegistry;
pub use sql::SqlRegistry;

/// Source of the declared active identities.
#[async_trait]
pub trait IdentityRegistry: Send + Sync {
    /// Active identities of one server scope, ordered by user id.
    async fn list_active_identities(&self, server_id: i64) -> Result<Vec<ActiveIdentity>, SyncError>;

    /// One active identity by user id.
    async fn find_active(
        &self,
        server_id: i64,
        user_id: i64,
    ) -> Result<Option<ActiveIdentity>, SyncError> {
        Ok(self
            .list_active_identities(server_id)
            .await?
            .into_iter()
            .find(|a| a.user_id == user_id))
    }
}

#[async_trait]
impl<R: IdentityRegistry + ?Sized> IdentityRegistry for Arc<R> {
    async fn list_active_identities(&self, server_id: i64) -> Result<Vec<ActiveIdentity>, SyncError> {
        (**self).list_active_identities(server_id).await
    }

    async fn find_active(
        &self,
        server_id: i64,
        user_id: i64,
    ) -> Result<Option<ActiveIdentity>, SyncError> {
        (**self).find_active(server_id, user_id).await
    }
}
