//! Periodic ledger refresh.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::node::EdgeNode;

/// Fold live readings into the ledger every `interval` until cancelled.
///
/// The first tick fires immediately. A failed round is logged and the
/// loop carries on.
pub async fn run_collector(node: Arc<EdgeNode>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("collector shutting down");
                return;
            }

            _ = ticker.tick() => {
                match node.collect_once().await {
                    Ok(report) => debug!(
                        collected = report.collected,
                        unavailable = report.unavailable,
                        "collector round finished"
                    ),
                    Err(e) => warn!(error = %e, kind = e.kind(), "collector round failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use lunet_ledger::{LedgerConfig, TrafficLedger};
    use lunet_sync::MemoryRegistry;
    use lunet_xray::scripted::ScriptedRunner;

    use super::*;
    use crate::config::AgentConfig;

    #[tokio::test]
    async fn stops_on_cancel() {
        let ledger = TrafficLedger::connect(&LedgerConfig::new("sqlite::memory:"))
            .await
            .unwrap();
        let node = Arc::new(EdgeNode::new(
            AgentConfig::default(),
            Arc::new(ScriptedRunner::new()),
            Arc::new(MemoryRegistry::new("lunet")),
            ledger,
        ));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_collector(
            node,
            Duration::from_millis(10),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
