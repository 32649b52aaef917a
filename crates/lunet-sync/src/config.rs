use std::time::Duration;

use lunet_core::defaults::{
    DEFAULT_STARTUP_SYNC_ATTEMPTS, DEFAULT_STARTUP_SYNC_BACKOFF_MS, DEFAULT_USER_LEVEL,
};
use serde::{Deserialize, Serialize};

/// Reconciler settings (`[sync]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// User level passed with every provisioning call.
    pub level: u32,
    /// Outer attempts of the startup sync.
    pub startup_attempts: u32,
    /// Pause between startup sync attempts, in milliseconds.
    pub startup_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_USER_LEVEL,
            startup_attempts: DEFAULT_STARTUP_SYNC_ATTEMPTS,
            startup_backoff_ms: DEFAULT_STARTUP_SYNC_BACKOFF_MS,
        }
    }
}

impl SyncConfig {
    pub fn startup_backoff(&self) -> Duration {
        Duration::from_millis(self.startup_backoff_ms)
    }
}
