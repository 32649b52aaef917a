//! Command-line and environment overrides applied on top of the config file.

use clap::Args;
use lunet_ledger::LedgerConfig;

use crate::config::AgentConfig;

#[derive(Debug, Clone, Args, Default)]
pub struct CliOverrides {
    /// Override the server scope id
    #[arg(long, global = true, env = "XRAY_SYNC_SERVER_ID")]
    pub server_id: Option<i64>,
    /// Override the management API address, e.g. 127.0.0.1:10085
    #[arg(long, global = true, env = "XRAY_ADDR")]
    pub xray_addr: Option<String>,
    /// Override the inbound tag users are attached to
    #[arg(long, global = true, env = "XRAY_INBOUND_TAG")]
    pub inbound_tag: Option<String>,
    /// Identity registry database URL
    #[arg(long, global = true, env = "XRAY_DB_DSN", hide_env_values = true)]
    pub registry_url: Option<String>,
    /// Traffic ledger SQLite path or URL
    #[arg(long, global = true, env = "XRAY_TRAFFIC_SQLITE_PATH")]
    pub ledger: Option<String>,
    /// Override the grpcurl protoset path
    #[arg(long, global = true, env = "XRAY_PROTOSET")]
    pub protoset: Option<String>,
    /// Override the grpcurl binary
    #[arg(long, global = true, env = "GRPCURL_BIN")]
    pub grpcurl_bin: Option<String>,
    /// Override the protoc binary
    #[arg(long, global = true, env = "PROTOC_BIN")]
    pub protoc_bin: Option<String>,
    /// Override the xray binary
    #[arg(long, global = true, env = "XRAY_BIN")]
    pub xray_bin: Option<String>,
    /// Override the identity domain
    #[arg(long, global = true)]
    pub identity_domain: Option<String>,
    /// Override the online activity window (seconds)
    #[arg(long, global = true)]
    pub activity_window_secs: Option<u64>,
    /// Override metrics listen address
    #[arg(long, global = true)]
    pub metrics_listen: Option<String>,
    /// Override log level (trace/debug/info/warn/error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

pub fn apply_overrides(config: &mut AgentConfig, overrides: &CliOverrides) {
    if let Some(v) = overrides.server_id {
        config.server_id = v;
    }
    if let Some(v) = &overrides.xray_addr {
        config.xray.addr = v.clone();
    }
    if let Some(v) = &overrides.inbound_tag {
        config.xray.inbound_tag = v.clone();
    }
    if let Some(v) = &overrides.registry_url {
        config.registry.url = Some(v.clone());
    }
    if let Some(v) = &overrides.ledger {
        let max_connections = config.ledger.max_connections;
        config.ledger = LedgerConfig::from_path_or_url(v).max_connections(max_connections);
    }
    if let Some(v) = &overrides.protoset {
        config.xray.protoset = Some(v.clone());
    }
    if let Some(v) = &overrides.grpcurl_bin {
        config.xray.grpcurl_bin = v.clone();
    }
    if let Some(v) = &overrides.protoc_bin {
        config.xray.protoc_bin = v.clone();
    }
    if let Some(v) = &overrides.xray_bin {
        config.xray.xray_bin = v.clone();
    }
    if let Some(v) = &overrides.identity_domain {
        config.identity_domain = v.clone();
    }
    if let Some(v) = overrides.activity_window_secs {
        config.activity_window_secs = v;
    }
    if let Some(v) = &overrides.metrics_listen {
        config.metrics.listen = Some(v.clone());
    }
    if let Some(v) = &overrides.log_level {
        config.log_level = Some(v.clone());
    }
}
