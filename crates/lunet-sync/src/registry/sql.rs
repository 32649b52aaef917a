//! Registry backed by the shared `vpn_keys` table.

use async_trait::async_trait;
use lunet_core::ActiveIdentity;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use tracing::debug;

use super::IdentityRegistry;
use crate::error::SyncError;

const ACTIVE_KEYS_PG: &str = r#"
SELECT user_id, uuid
FROM vpn_keys
WHERE status = 'active' AND server_id = $1
ORDER BY user_id
"#;

const ACTIVE_KEYS: &str = r#"
SELECT user_id, uuid
FROM vpn_keys
WHERE status = 'active' AND server_id = ?
ORDER BY user_id
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Postgres,
    Generic,
}

impl Dialect {
    fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if url.starts_with("mysql://")
            || url.starts_with("mariadb://")
            || url.starts_with("sqlite:")
        {
            Some(Self::Generic)
        } else {
            None
        }
    }
}

/// Read-only view of the identity registry database.
#[derive(Debug, Clone)]
pub struct SqlRegistry {
    pool: AnyPool,
    dialect: Dialect,
    domain: String,
}

impl SqlRegistry {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        domain: impl Into<String>,
    ) -> Result<Self, SyncError> {
        sqlx::any::install_default_drivers();

        let dialect = Dialect::from_url(url)
            .ok_or_else(|| SyncError::UnsupportedUrl(url.split(':').next().unwrap_or_default().to_string()))?;
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await?;
        Ok(Self {
            pool,
            dialect,
            domain: domain.into(),
        })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

#[async_trait]
impl IdentityRegistry for SqlRegistry {
    async fn list_active_identities(&self, server_id: i64) -> Result<Vec<ActiveIdentity>, SyncError> {
        let sql = match self.dialect {
            Dialect::Postgres => ACTIVE_KEYS_PG,
            Dialect::Generic => ACTIVE_KEYS,
        };
        let rows = sqlx::query(sql).bind(server_id).fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let user_id: i64 = row.try_get("user_id")?;
            let uuid: String = row.try_get("uuid")?;
            out.push(ActiveIdentity::new(user_id, uuid, &self.domain));
        }
        debug!(server_id, active = out.len(), "active identities loaded");
        Ok(out)
    }
}
