use async_trait::async_trait;
use lunet_core::{ActiveIdentity, Identity, IdentityStatus};
use parking_lot::RwLock;

use super::IdentityRegistry;
use crate::error::SyncError;

/// Registry held in memory, for tests and static deployments.
#[derive(Debug)]
pub struct MemoryRegistry {
    domain: String,
    rows: RwLock<Vec<Identity>>,
}

impl MemoryRegistry {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn from_identities<I>(domain: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = Identity>,
    {
        Self {
            domain: domain.into(),
            rows: RwLock::new(rows.into_iter().collect()),
        }
    }

    /// Add or replace the row for `(server_id, user_id)`.
    pub fn upsert(&self, identity: Identity) {
        let mut rows = self.rows.write();
        match rows
            .iter_mut()
            .find(|r| r.server_id == identity.server_id && r.user_id == identity.user_id)
        {
            Some(row) => *row = identity,
            None => rows.push(identity),
        }
    }

    pub fn set_status(&self, server_id: i64, user_id: i64, status: IdentityStatus) -> bool {
        let mut rows = self.rows.write();
        match rows
            .iter_mut()
            .find(|r| r.server_id == server_id && r.user_id == user_id)
        {
            Some(row) => {
                row.status = status;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl IdentityRegistry for MemoryRegistry {
    async fn list_active_identities(&self, server_id: i64) -> Result<Vec<ActiveIdentity>, SyncError> {
        let mut out: Vec<ActiveIdentity> = self
            .rows
            .read()
            .iter()
            .filter(|r| r.server_id == server_id && r.status == IdentityStatus::Active)
            .map(|r| ActiveIdentity::new(r.user_id, r.uuid.clone(), &self.domain))
            .collect();
        out.sort_by_key(|a| a.user_id);
        Ok(out)
    }
}
