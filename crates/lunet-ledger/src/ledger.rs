use std::collections::HashMap;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::merge::{Totals, fold_counter};
use crate::schema;

/// One reading in a bulk apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotItem {
    pub user_id: i64,
    pub email: String,
    pub uplink: i64,
    pub downlink: i64,
    /// Whether the reading came from a successful upstream read.
    pub available: bool,
}

/// Rows affected by [`TrafficLedger::reset_users`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetTarget {
    /// Every row of the server.
    All,
    /// Only these users. An empty list resets nothing.
    Users(Vec<i64>),
}

struct Row {
    last_uplink: i64,
    last_downlink: i64,
    total_uplink: i64,
    total_downlink: i64,
}

/// SQLite-backed cumulative traffic store.
///
/// Writes are fully serialized on one lock; reads are not.
pub struct TrafficLedger {
    pool: SqlitePool,
    write_lock: Mutex<()>,
    initialized: OnceCell<()>,
}

impl TrafficLedger {
    /// Open the database, creating the file and its directory if needed.
    ///
    /// The schema is created by [`ensure_initialized`](Self::ensure_initialized).
    pub async fn connect(config: &LedgerConfig) -> Result<Self, LedgerError> {
        if let Some(parent) = config.file_path().as_deref().and_then(|p| p.parent()) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| LedgerError::InvalidUrl {
                url: config.url.clone(),
                reason: e.to_string(),
            })?
            .create_if_missing(true)
            .busy_timeout(config.busy_timeout());

        let mut pool = SqlitePoolOptions::new().max_connections(config.max_connections.max(1));
        if config.is_memory() {
            // each connection of an in-memory url is its own database
            pool = pool.max_connections(1).idle_timeout(None).max_lifetime(None);
        }
        let pool = pool.connect_with(options).await?;

        debug!(url = %config.url, "ledger connected");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
            initialized: OnceCell::new(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the table and indexes once per ledger instance.
    ///
    /// Safe to call repeatedly and concurrently. A failed attempt is
    /// retried by the next call.
    pub async fn ensure_initialized(&self) -> Result<(), LedgerError> {
        self.initialized
            .get_or_try_init(|| async {
                let mut tx = self.pool.begin().await?;
                for stmt in [
                    schema::CREATE_TABLE,
                    schema::CREATE_INDEX_SERVER,
                    schema::CREATE_INDEX_USER,
                ] {
                    sqlx::query(stmt).execute(&mut *tx).await?;
                }
                tx.commit().await?;
                info!("traffic ledger schema ready");
                Ok::<(), LedgerError>(())
            })
            .await?;
        Ok(())
    }

    /// Fold one raw reading into the row of `(server_id, user_id)`.
    pub async fn apply_snapshot(
        &self,
        server_id: i64,
        user_id: i64,
        email: &str,
        current_uplink: i64,
        current_downlink: i64,
    ) -> Result<Totals, LedgerError> {
        self.ensure_initialized().await?;
        let item = SnapshotItem {
            user_id,
            email: email.to_string(),
            uplink: current_uplink,
            downlink: current_downlink,
            available: true,
        };

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let totals = merge_item(&mut tx, server_id, &item, &now_rfc3339()).await?;
        tx.commit().await?;
        Ok(totals)
    }

    /// Fold a batch of readings in one transaction.
    ///
    /// Unavailable items never move `last_*`; their rows are created
    /// (at zero) if absent. Items are applied in order, so a repeated
    /// user id sees the earlier item's result.
    pub async fn apply_snapshots_bulk(
        &self,
        server_id: i64,
        items: &[SnapshotItem],
    ) -> Result<HashMap<i64, Totals>, LedgerError> {
        self.ensure_initialized().await?;
        if items.is_empty() {
            return Ok(HashMap::new());
        }

        let now = now_rfc3339();
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let mut out = HashMap::with_capacity(items.len());
        for item in items {
            let totals = merge_item(&mut tx, server_id, item, &now).await?;
            out.insert(item.user_id, totals);
        }
        tx.commit().await?;
        lunet_metrics::record_ledger_write("bulk");
        debug!(server_id, items = items.len(), "bulk snapshot applied");
        Ok(out)
    }

    /// Persisted totals; zeros when the row does not exist.
    pub async fn get_totals(&self, server_id: i64, user_id: i64) -> Result<Totals, LedgerError> {
        self.ensure_initialized().await?;
        let row: Option<(i64, i64)> = sqlx::query_as(schema::SELECT_TOTALS)
            .bind(server_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map_or_else(Totals::default, |(up, down)| Totals::new(up, down)))
    }

    /// Zero the history of the targeted rows. Returns the number of rows
    /// reset.
    pub async fn reset_users(
        &self,
        server_id: i64,
        target: ResetTarget,
    ) -> Result<u64, LedgerError> {
        self.ensure_initialized().await?;
        if matches!(&target, ResetTarget::Users(ids) if ids.is_empty()) {
            return Ok(0);
        }

        let mut query = QueryBuilder::<Sqlite>::new(schema::RESET_PREFIX);
        query.push_bind(now_rfc3339());
        query.push(" WHERE server_id = ");
        query.push_bind(server_id);
        if let ResetTarget::Users(ids) = &target {
            query.push(" AND user_id IN (");
            let mut list = query.separated(", ");
            for id in ids {
                list.push_bind(*id);
            }
            list.push_unseparated(")");
        }

        let _guard = self.write_lock.lock().await;
        let result = query.build().execute(&self.pool).await?;
        lunet_metrics::record_ledger_write("reset");
        info!(server_id, rows = result.rows_affected(), "ledger history reset");
        Ok(result.rows_affected())
    }
}

impl std::fmt::Debug for TrafficLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficLedger")
            .field("initialized", &self.initialized.initialized())
            .finish_non_exhaustive()
    }
}

async fn merge_item(
    conn: &mut SqliteConnection,
    server_id: i64,
    item: &SnapshotItem,
    now: &str,
) -> Result<Totals, LedgerError> {
    let current_up = item.uplink.max(0);
    let current_down = item.downlink.max(0);

    let row: Option<(i64, i64, i64, i64)> = sqlx::query_as(schema::SELECT_ROW)
        .bind(server_id)
        .bind(item.user_id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some((last_uplink, last_downlink, total_uplink, total_downlink)) = row else {
        let (up, down) = if item.available {
            (current_up, current_down)
        } else {
            (0, 0)
        };
        sqlx::query(schema::INSERT_ROW)
            .bind(server_id)
            .bind(item.user_id)
            .bind(&item.email)
            .bind(up)
            .bind(down)
            .bind(up)
            .bind(down)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        lunet_metrics::record_ledger_write("insert");
        return Ok(Totals::new(up, down));
    };

    let row = Row {
        last_uplink: last_uplink.max(0),
        last_downlink: last_downlink.max(0),
        total_uplink: total_uplink.max(0),
        total_downlink: total_downlink.max(0),
    };
    let next = if item.available {
        let (up, up_reset) = fold_counter(row.last_uplink, row.total_uplink, current_up);
        let (down, down_reset) = fold_counter(row.last_downlink, row.total_downlink, current_down);
        for (reset, direction, last, current) in [
            (up_reset, "uplink", row.last_uplink, current_up),
            (down_reset, "downlink", row.last_downlink, current_down),
        ] {
            if reset {
                lunet_metrics::record_counter_reset(direction);
                info!(
                    server_id,
                    user_id = item.user_id,
                    direction,
                    last,
                    current,
                    "upstream counter reset detected"
                );
            }
        }
        Row {
            last_uplink: current_up,
            last_downlink: current_down,
            total_uplink: up,
            total_downlink: down,
        }
    } else {
        row
    };

    sqlx::query(schema::UPDATE_ROW)
        .bind(&item.email)
        .bind(next.last_uplink)
        .bind(next.last_downlink)
        .bind(next.total_uplink)
        .bind(next.total_downlink)
        .bind(now)
        .bind(server_id)
        .bind(item.user_id)
        .execute(&mut *conn)
        .await?;
    lunet_metrics::record_ledger_write("update");
    Ok(Totals::new(next.total_uplink, next.total_downlink))
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests;
