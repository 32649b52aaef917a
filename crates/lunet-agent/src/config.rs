//! Agent configuration: types, file loading and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use lunet_core::defaults::{
    DEFAULT_ACTIVITY_WINDOW_SECS, DEFAULT_COLLECTOR_INTERVAL_SECS, DEFAULT_IDENTITY_DOMAIN,
    DEFAULT_ONLINE_TRACKER_CAPACITY, DEFAULT_ONLINE_TRACKER_RETENTION_SECS, DEFAULT_SERVER_ID,
};
use lunet_ledger::LedgerConfig;
use lunet_stats::TrackerConfig;
use lunet_sync::SyncConfig;
use lunet_xray::XrayConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config format")]
    UnsupportedFormat,
    #[error("validation: {0}")]
    Validation(String),
}

/// Full agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Server scope whose identities this node serves.
    pub server_id: i64,
    /// Domain of derived identity strings (`user-{id}@{domain}`).
    pub identity_domain: String,
    /// Online inference window in seconds (at least 15 is used).
    pub activity_window_secs: u64,
    pub log_level: Option<String>,
    pub xray: XrayConfig,
    pub ledger: LedgerConfig,
    pub registry: RegistryConfig,
    pub sync: SyncConfig,
    pub collector: CollectorConfig,
    pub online: OnlineConfig,
    pub metrics: MetricsConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_id: DEFAULT_SERVER_ID,
            identity_domain: DEFAULT_IDENTITY_DOMAIN.to_string(),
            activity_window_secs: DEFAULT_ACTIVITY_WINDOW_SECS,
            log_level: None,
            xray: XrayConfig::default(),
            ledger: LedgerConfig::default(),
            registry: RegistryConfig::default(),
            sync: SyncConfig::default(),
            collector: CollectorConfig::default(),
            online: OnlineConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn tracker(&self) -> TrackerConfig {
        TrackerConfig {
            activity_window_secs: self.activity_window_secs,
            capacity: self.online.capacity,
            retention_secs: self.online.retention_secs,
        }
    }
}

/// Identity registry database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// `postgres://`, `mysql://` or `sqlite:` URL. Without one the
    /// registry is empty.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Seconds between ledger refreshes in `run`. 0 disables the collector.
    pub interval_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_COLLECTOR_INTERVAL_SECS,
        }
    }
}

impl CollectorConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

/// Online tracker bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineConfig {
    pub capacity: usize,
    pub retention_secs: u64,
}

impl Default for OnlineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_ONLINE_TRACKER_CAPACITY,
            retention_secs: DEFAULT_ONLINE_TRACKER_RETENTION_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus listen address, e.g. `127.0.0.1:9108`.
    pub listen: Option<String>,
}

pub fn load_config(path: impl AsRef<Path>) -> Result<AgentConfig, ConfigError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)?;
    match path.extension().and_then(|s| s.to_str()).unwrap_or("") {
        "json" | "jsonc" => {
            let stripped = json_comments::StripComments::new(data.as_bytes());
            Ok(serde_json::from_reader(stripped)?)
        }
        "yaml" | "yml" => Ok(serde_yaml::from_str(&data)?),
        "toml" => Ok(toml::from_str(&data)?),
        _ => Err(ConfigError::UnsupportedFormat),
    }
}

pub fn validate_config(config: &AgentConfig) -> Result<(), ConfigError> {
    if config.server_id <= 0 {
        return Err(ConfigError::Validation("server_id must be > 0".into()));
    }
    if config.identity_domain.trim().is_empty() {
        return Err(ConfigError::Validation("identity_domain is empty".into()));
    }
    if config.xray.addr.trim().is_empty() {
        return Err(ConfigError::Validation("xray.addr is empty".into()));
    }
    if config.xray.inbound_tag.trim().is_empty() {
        return Err(ConfigError::Validation("xray.inbound_tag is empty".into()));
    }
    if config.xray.command_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "xray.command_timeout_secs must be > 0".into(),
        ));
    }
    if config.ledger.url.trim().is_empty() {
        return Err(ConfigError::Validation("ledger.url is empty".into()));
    }
    if config.sync.startup_attempts == 0 {
        return Err(ConfigError::Validation(
            "sync.startup_attempts must be > 0".into(),
        ));
    }
    if config.online.capacity == 0 {
        return Err(ConfigError::Validation("online.capacity must be > 0".into()));
    }
    Ok(())
}
