//! Edge node facade: the operations the agent exposes upward.
//!
//! Every traffic query merges the live reading into the ledger, so
//! cumulative totals advance whenever anyone looks.

use std::collections::HashMap;
use std::sync::Arc;

use lunet_core::{ActiveIdentity, identity_for_user, user_id_from_identity};
use lunet_ledger::{ResetTarget, SnapshotItem, Totals, TrafficLedger};
use lunet_stats::{OnlineStatus, OnlineTracker, ResetSummary, StatBridge, TrafficReading};
use lunet_sync::{
    IdentityRegistry, MemoryRegistry, ProvisionOutcome, Provisioner, Reconciler, ResyncReport,
    SqlRegistry, classify_provision,
};
use lunet_xray::{CommandRunner, ControlPlane, ProcessRunner};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::AgentError;

/// Who an operation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityRef {
    UserId(i64),
    Email(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub email: Option<String>,
    pub user_id: Option<i64>,
    pub uuid: Option<String>,
    pub level: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionResponse {
    pub email: String,
    pub uuid: String,
    pub result: ProvisionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoveResponse {
    pub email: String,
    pub output: String,
}

/// Live reading and persisted totals of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserTraffic {
    pub user_id: Option<i64>,
    pub identity: String,
    pub live: TrafficReading,
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficReport {
    pub server_id: i64,
    pub inbound: TrafficReading,
    pub users: Vec<UserTraffic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserOnline {
    pub user_id: i64,
    pub identity: String,
    #[serde(flatten)]
    pub status: OnlineStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnlineReport {
    pub server_id: i64,
    pub online_now: usize,
    pub users: Vec<UserOnline>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub server_id: i64,
    /// The inbound counters could be read.
    pub stats_available: bool,
    pub active_identities: usize,
    pub online_now: usize,
    pub offline: usize,
    /// Identities with a native online counter upstream.
    pub native_online: usize,
    pub inbound: TrafficReading,
    pub users_uplink: i64,
    pub users_downlink: i64,
    pub users_total: i64,
}

/// What `reset_traffic` zeroes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResetScope {
    /// Live inbound counters.
    Inbound,
    /// Live per-identity counters.
    Users,
    /// Persisted ledger history.
    Ledger,
    /// All of the above.
    All,
}

impl ResetScope {
    fn inbound(self) -> bool {
        matches!(self, Self::Inbound | Self::All)
    }

    fn users(self) -> bool {
        matches!(self, Self::Users | Self::All)
    }

    fn ledger(self) -> bool {
        matches!(self, Self::Ledger | Self::All)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub scope: ResetScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbound: Option<ResetSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<ResetSummary>,
    /// Ledger rows zeroed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_rows: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectReport {
    pub server_id: i64,
    pub collected: usize,
    pub unavailable: usize,
}

pub struct EdgeNode {
    config: AgentConfig,
    bridge: StatBridge,
    ledger: TrafficLedger,
    reconciler: Reconciler,
}

impl EdgeNode {
    /// Assemble a node from its collaborators.
    pub fn new(
        config: AgentConfig,
        runner: Arc<dyn CommandRunner>,
        registry: Arc<dyn IdentityRegistry>,
        ledger: TrafficLedger,
    ) -> Self {
        let control = ControlPlane::new(config.xray.clone(), runner);
        let provisioner: Arc<dyn Provisioner> = Arc::new(control.clone());
        let reconciler = Reconciler::new(registry, provisioner, config.server_id, config.sync.clone());
        let bridge = StatBridge::new(control, OnlineTracker::new(config.tracker()));
        Self {
            config,
            bridge,
            ledger,
            reconciler,
        }
    }

    /// Build a node talking to real binaries and databases.
    pub async fn from_config(config: AgentConfig) -> Result<Self, AgentError> {
        let runner: Arc<dyn CommandRunner> =
            Arc::new(ProcessRunner::new(config.xray.command_timeout()));

        let registry: Arc<dyn IdentityRegistry> = match config.registry.url.as_deref() {
            Some(url) => Arc::new(
                SqlRegistry::connect(url, config.registry.max_connections, &config.identity_domain)
                    .await?,
            ),
            None => {
                warn!("no registry url configured, serving an empty identity set");
                Arc::new(MemoryRegistry::new(&config.identity_domain))
            }
        };

        let ledger = TrafficLedger::connect(&config.ledger).await?;
        ledger.ensure_initialized().await?;

        Ok(Self::new(config, runner, registry, ledger))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn server_id(&self) -> i64 {
        self.config.server_id
    }

    pub fn bridge(&self) -> &StatBridge {
        &self.bridge
    }

    pub fn ledger(&self) -> &TrafficLedger {
        &self.ledger
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub async fn resync(&self) -> Result<ResyncReport, AgentError> {
        Ok(self.reconciler.resync().await?)
    }

    pub async fn startup_sync(&self) -> Option<ResyncReport> {
        self.reconciler.startup_sync().await
    }

    /// Add one identity to the live proxy.
    ///
    /// The email defaults to the derived identity of `user_id`, the UUID
    /// to the registry's (or a fresh v4 one). An identity that already
    /// exists upstream is a success carrying a note.
    pub async fn provision_identity(
        &self,
        request: ProvisionRequest,
    ) -> Result<ProvisionResponse, AgentError> {
        let email = match (request.email.as_deref().map(str::trim), request.user_id) {
            (Some(email), _) if !email.is_empty() => email.to_string(),
            (_, Some(user_id)) => identity_for_user(user_id, &self.config.identity_domain),
            _ => {
                return Err(AgentError::InvalidArgument(
                    "email or user_id is required".into(),
                ));
            }
        };

        let registered = match request.user_id {
            Some(user_id) if request.uuid.is_none() => {
                self.reconciler
                    .registry()
                    .find_active(self.server_id(), user_id)
                    .await?
            }
            _ => None,
        };
        let uuid = request
            .uuid
            .or_else(|| registered.map(|a| a.uuid))
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let level = request.level.unwrap_or(self.config.sync.level);

        let result = self
            .reconciler
            .provisioner()
            .add_user(&email, level, &uuid)
            .await;
        let outcome = classify_provision(&result);
        lunet_metrics::record_provision_result(outcome.as_str());

        match result {
            Ok(output) => {
                info!(email = %email, uuid = %uuid, "identity provisioned");
                Ok(ProvisionResponse {
                    email,
                    uuid,
                    result: outcome,
                    note: None,
                    output: Some(output),
                })
            }
            Err(_) if outcome == ProvisionOutcome::Already => {
                info!(email = %email, uuid = %uuid, "identity already provisioned");
                Ok(ProvisionResponse {
                    email,
                    uuid,
                    result: outcome,
                    note: Some("already exists".into()),
                    output: None,
                })
            }
            Err(e) => {
                error!(email = %email, error = %e, "identity provisioning failed");
                Err(e.into())
            }
        }
    }

    pub async fn remove_identity(&self, target: IdentityRef) -> Result<RemoveResponse, AgentError> {
        let email = self.identity_string(&target)?;
        let output = self.reconciler.provisioner().remove_user(&email).await?;
        info!(email = %email, "identity removed");
        Ok(RemoveResponse { email, output })
    }

    /// Traffic of every active identity, folded into the ledger.
    pub async fn traffic(&self) -> Result<TrafficReport, AgentError> {
        let active = self.reconciler.active_identities().await?;
        let inbound = self.bridge.get_inbound_traffic().await;
        let (live, totals) = self.fold_live(&active).await?;

        let users = active
            .into_iter()
            .map(|a| UserTraffic {
                live: live.get(&a.identity).copied().unwrap_or_default(),
                totals: totals.get(&a.user_id).copied().unwrap_or_default(),
                user_id: Some(a.user_id),
                identity: a.identity,
            })
            .collect();

        Ok(TrafficReport {
            server_id: self.server_id(),
            inbound,
            users,
        })
    }

    /// Traffic of one identity.
    ///
    /// The live reading is folded into the ledger only when it was read
    /// successfully; otherwise the persisted totals are returned as is.
    /// An email outside the derived form has no ledger row.
    pub async fn user_traffic(&self, target: IdentityRef) -> Result<UserTraffic, AgentError> {
        let (user_id, identity) = match target {
            IdentityRef::UserId(user_id) => {
                let identity = match self
                    .reconciler
                    .registry()
                    .find_active(self.server_id(), user_id)
                    .await?
                {
                    Some(active) => active.identity,
                    None => identity_for_user(user_id, &self.config.identity_domain),
                };
                (Some(user_id), identity)
            }
            IdentityRef::Email(_) => {
                let identity = self.identity_string(&target)?;
                (
                    user_id_from_identity(&identity, &self.config.identity_domain),
                    identity,
                )
            }
        };

        let live = self
            .bridge
            .get_users_traffic(std::slice::from_ref(&identity))
            .await
            .remove(&identity)
            .unwrap_or_default();

        let totals = match user_id {
            Some(user_id) if live.available => {
                self.ledger
                    .apply_snapshot(self.server_id(), user_id, &identity, live.uplink, live.downlink)
                    .await?
            }
            Some(user_id) => self.ledger.get_totals(self.server_id(), user_id).await?,
            None => Totals::default(),
        };

        Ok(UserTraffic {
            user_id,
            identity,
            live,
            totals,
        })
    }

    /// Online state of every active identity. The live readings used for
    /// inference are folded into the ledger.
    pub async fn online(&self) -> Result<OnlineReport, AgentError> {
        let active = self.reconciler.active_identities().await?;
        let identities = identity_strings(&active);
        let (traffic, _) = self.fold_live(&active).await?;
        let online = self.bridge.get_users_online(&identities, Some(&traffic)).await;

        let users: Vec<UserOnline> = active
            .into_iter()
            .map(|a| UserOnline {
                status: online.get(&a.identity).copied().unwrap_or_default(),
                user_id: a.user_id,
                identity: a.identity,
            })
            .collect();

        Ok(OnlineReport {
            server_id: self.server_id(),
            online_now: users.iter().filter(|u| u.status.online).count(),
            users,
        })
    }

    pub async fn summary(&self) -> Result<NodeSummary, AgentError> {
        let active = self.reconciler.active_identities().await?;
        let identities = identity_strings(&active);
        let inbound = self.bridge.get_inbound_traffic().await;
        let (traffic, _) = self.fold_live(&active).await?;
        let online = self.bridge.get_users_online(&identities, Some(&traffic)).await;

        let online_now = online.values().filter(|s| s.online).count();
        let native_online = online.values().filter(|s| s.supported).count();
        let (users_uplink, users_downlink) = traffic
            .values()
            .fold((0i64, 0i64), |(up, down), t| {
                (up.saturating_add(t.uplink), down.saturating_add(t.downlink))
            });

        Ok(NodeSummary {
            server_id: self.server_id(),
            stats_available: inbound.available,
            active_identities: active.len(),
            online_now,
            offline: active.len().saturating_sub(online_now),
            native_online,
            inbound,
            users_uplink,
            users_downlink,
            users_total: users_uplink.saturating_add(users_downlink),
        })
    }

    /// Reset traffic for `scope`.
    ///
    /// `user_ids` narrows the user and ledger scopes; without it they
    /// cover the live counters of every active identity and every
    /// ledger row of the server.
    pub async fn reset_traffic(
        &self,
        scope: ResetScope,
        user_ids: Option<Vec<i64>>,
    ) -> Result<ResetReport, AgentError> {
        let mut report = ResetReport {
            scope,
            inbound: None,
            users: None,
            ledger_rows: None,
        };

        if scope.inbound() {
            report.inbound = Some(self.bridge.reset_inbound_traffic().await);
        }

        if scope.users() {
            let identities: Vec<String> = match &user_ids {
                Some(ids) => ids
                    .iter()
                    .map(|&id| identity_for_user(id, &self.config.identity_domain))
                    .collect(),
                None => identity_strings(&self.reconciler.active_identities().await?),
            };
            report.users = Some(self.bridge.reset_users_traffic(&identities).await);
        }

        if scope.ledger() {
            let target = match user_ids {
                Some(ids) => ResetTarget::Users(ids),
                None => ResetTarget::All,
            };
            report.ledger_rows = Some(self.ledger.reset_users(self.server_id(), target).await?);
        }

        Ok(report)
    }

    pub async fn ledger_totals(&self, user_id: i64) -> Result<Totals, AgentError> {
        Ok(self.ledger.get_totals(self.server_id(), user_id).await?)
    }

    /// Fold the live reading of every active identity into the ledger.
    pub async fn collect_once(&self) -> Result<CollectReport, AgentError> {
        let active = self.reconciler.active_identities().await?;
        let (live, _) = self.fold_live(&active).await?;
        let unavailable = live.values().filter(|t| !t.available).count();

        let pruned = self.bridge.tracker().prune(unix_now());
        lunet_metrics::set_online_tracker_entries(self.bridge.tracker().len());
        if pruned > 0 {
            info!(pruned, "online tracker pruned");
        }

        Ok(CollectReport {
            server_id: self.server_id(),
            collected: active.len() - unavailable,
            unavailable,
        })
    }

    async fn fold_live(
        &self,
        active: &[ActiveIdentity],
    ) -> Result<(HashMap<String, TrafficReading>, HashMap<i64, Totals>), AgentError> {
        let live = self.bridge.get_users_traffic(&identity_strings(active)).await;
        let items: Vec<SnapshotItem> = active
            .iter()
            .map(|a| {
                let reading = live.get(&a.identity).copied().unwrap_or_default();
                SnapshotItem {
                    user_id: a.user_id,
                    email: a.identity.clone(),
                    uplink: reading.uplink,
                    downlink: reading.downlink,
                    available: reading.available,
                }
            })
            .collect();
        let totals = self
            .ledger
            .apply_snapshots_bulk(self.server_id(), &items)
            .await?;
        Ok((live, totals))
    }

    fn identity_string(&self, target: &IdentityRef) -> Result<String, AgentError> {
        match target {
            IdentityRef::UserId(user_id) => {
                Ok(identity_for_user(*user_id, &self.config.identity_domain))
            }
            IdentityRef::Email(email) => {
                let email = email.trim();
                if email.is_empty() {
                    return Err(AgentError::InvalidArgument("email is empty".into()));
                }
                Ok(email.to_string())
            }
        }
    }
}

impl std::fmt::Debug for EdgeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeNode")
            .field("server_id", &self.config.server_id)
            .field("bridge", &self.bridge)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

fn identity_strings(active: &[ActiveIdentity]) -> Vec<String> {
    active.iter().map(|a| a.identity.clone()).collect()
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
