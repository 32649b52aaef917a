use std::sync::Arc;

use lunet_core::ActiveIdentity;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::provisioner::{ProvisionOutcome, Provisioner, classify_provision};
use crate::registry::IdentityRegistry;

/// Outcome of provisioning one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncItem {
    pub user_id: i64,
    pub uuid: String,
    pub identity: String,
    pub result: ProvisionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The failure happened below the proxy (no answer received).
    #[serde(skip)]
    pub transport_failure: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    /// Identities provisioned or already present.
    pub synced: usize,
    pub failed: Vec<SyncItem>,
    pub details: Vec<SyncItem>,
}

impl ResyncReport {
    fn from_items(details: Vec<SyncItem>) -> Self {
        let synced = details.iter().filter(|d| d.result.is_synced()).count();
        let failed = details
            .iter()
            .filter(|d| d.result == ProvisionOutcome::Error)
            .cloned()
            .collect();
        Self {
            synced,
            failed,
            details,
        }
    }

    /// Every identity failed without reaching the proxy.
    fn is_outage(&self) -> bool {
        !self.details.is_empty() && self.details.iter().all(|d| d.transport_failure)
    }
}

/// Registry-to-proxy reconciliation loop for one server scope.
pub struct Reconciler {
    registry: Arc<dyn IdentityRegistry>,
    provisioner: Arc<dyn Provisioner>,
    server_id: i64,
    config: SyncConfig,
}

impl Reconciler {
    pub fn new(
        registry: Arc<dyn IdentityRegistry>,
        provisioner: Arc<dyn Provisioner>,
        server_id: i64,
        config: SyncConfig,
    ) -> Self {
        Self {
            registry,
            provisioner,
            server_id,
            config,
        }
    }

    pub fn server_id(&self) -> i64 {
        self.server_id
    }

    pub fn registry(&self) -> &Arc<dyn IdentityRegistry> {
        &self.registry
    }

    pub fn provisioner(&self) -> &Arc<dyn Provisioner> {
        &self.provisioner
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn active_identities(&self) -> Result<Vec<ActiveIdentity>, SyncError> {
        self.registry.list_active_identities(self.server_id).await
    }

    /// Provision one identity and classify the result.
    pub async fn provision(&self, identity: &ActiveIdentity) -> SyncItem {
        let result = self
            .provisioner
            .add_user(&identity.identity, self.config.level, &identity.uuid)
            .await;
        let outcome = classify_provision(&result);
        lunet_metrics::record_provision_result(outcome.as_str());

        let (error, transport_failure) = match &result {
            Err(e) if outcome == ProvisionOutcome::Error => {
                error!(uuid = %identity.uuid, identity = %identity.identity, error = %e, "provisioning failed");
                (Some(e.detail()), e.is_transport_failure())
            }
            _ => {
                info!(uuid = %identity.uuid, identity = %identity.identity, result = outcome.as_str(), "identity provisioned");
                (None, false)
            }
        };
        SyncItem {
            user_id: identity.user_id,
            uuid: identity.uuid.clone(),
            identity: identity.identity.clone(),
            result: outcome,
            error,
            transport_failure,
        }
    }

    async fn sync_all(&self, identities: &[ActiveIdentity]) -> ResyncReport {
        let mut details = Vec::with_capacity(identities.len());
        for identity in identities {
            details.push(self.provision(identity).await);
        }
        ResyncReport::from_items(details)
    }

    /// Provision every active identity. One failure never stops the rest;
    /// only a registry failure is an error.
    pub async fn resync(&self) -> Result<ResyncReport, SyncError> {
        let active = self.active_identities().await?;
        info!(server_id = self.server_id, active = active.len(), "resync started");
        let report = self.sync_all(&active).await;
        info!(
            server_id = self.server_id,
            synced = report.synced,
            failed = report.failed.len(),
            "resync finished"
        );
        Ok(report)
    }

    /// Resync at process start, retrying only on systemic failure.
    ///
    /// A systemic failure is a registry error, or every identity failing
    /// without reaching the proxy. Per-identity failures in an otherwise
    /// working loop are final. Returns the last report, if any loop ran;
    /// never fails.
    pub async fn startup_sync(&self) -> Option<ResyncReport> {
        let attempts = self.config.startup_attempts.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            match self.resync().await {
                Ok(report) if !report.is_outage() => {
                    info!(
                        attempt,
                        attempts,
                        synced = report.synced,
                        total = report.details.len(),
                        "startup sync finished"
                    );
                    return Some(report);
                }
                Ok(report) => {
                    warn!(attempt, attempts, total = report.details.len(), "startup sync: control plane unreachable");
                    last = Some(report);
                }
                Err(e) => warn!(attempt, attempts, error = %e, "startup sync: registry unavailable"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.startup_backoff()).await;
            }
        }

        error!(attempts, "startup sync giving up, serving with partial state");
        last
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("server_id", &self.server_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
