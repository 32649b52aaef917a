//! Edge node agent.
//!
//! Wires the control-plane codec, stat bridge, traffic ledger and
//! reconciler into one [`EdgeNode`], and drives it from the `lunet-rs`
//! CLI: one-shot commands print JSON, `run` keeps the node converged and
//! the ledger current until shutdown.

pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod node;
pub mod overrides;

pub use cli::{AgentArgs, Command, run};
pub use config::{
    AgentConfig, CollectorConfig, ConfigError, MetricsConfig, OnlineConfig, RegistryConfig,
    load_config, validate_config,
};
pub use error::AgentError;
pub use node::{
    CollectReport, EdgeNode, IdentityRef, NodeSummary, OnlineReport, ProvisionRequest,
    ProvisionResponse, RemoveResponse, ResetReport, ResetScope, TrafficReport, UserOnline,
    UserTraffic,
};
pub use overrides::{CliOverrides, apply_overrides};
