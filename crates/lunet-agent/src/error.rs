//! Agent error types.

use lunet_ledger::LedgerError;
use lunet_sync::SyncError;
use lunet_xray::XrayError;

use crate::config::ConfigError;

/// Agent error type.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("control plane: {0}")]
    Xray(#[from] XrayError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("registry: {0}")]
    Sync(#[from] SyncError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("identity not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl AgentError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::InvalidArgument(_) => lunet_core::ERROR_CONFIG,
            Self::Xray(e) => e.kind(),
            Self::Ledger(e) => e.kind(),
            Self::Sync(e) => e.kind(),
            Self::Json(_) => lunet_core::ERROR_DECODE,
            Self::Io(_) => lunet_core::ERROR_PERSISTENCE,
            Self::NotFound(_) => lunet_core::ERROR_REGISTRY,
        }
    }
}
