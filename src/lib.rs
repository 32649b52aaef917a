//! # lunet-rs
//!
//! Edge node agent for an xray proxy: keeps the proxy's users converged
//! to a database-declared identity set and turns its volatile counters
//! into durable cumulative traffic totals.
//!
//! ## Crates
//!
//! - [`lunet_core`] - Identity model, defaults and error kinds
//! - [`lunet_xray`] - Control-plane codec and management RPC chain
//! - [`lunet_stats`] - Stat bridge and online inference
//! - [`lunet_ledger`] - SQLite traffic ledger
//! - [`lunet_sync`] - Identity registry and reconciler
//! - [`lunet_metrics`] - Prometheus metrics
//! - [`lunet_agent`] - Configuration, node facade and CLI

pub use lunet_agent as agent;
pub use lunet_core as core;
pub use lunet_ledger as ledger;
pub use lunet_metrics as metrics;
pub use lunet_stats as stats;
pub use lunet_sync as sync;
pub use lunet_xray as xray;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use lunet_agent::{AgentConfig, EdgeNode, load_config, validate_config};
    pub use lunet_ledger::{Totals, TrafficLedger};
    pub use lunet_stats::StatBridge;
    pub use lunet_sync::{IdentityRegistry, Reconciler};
    pub use lunet_xray::{ControlPlane, XrayConfig};
}
