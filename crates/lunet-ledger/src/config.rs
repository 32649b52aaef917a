use std::path::PathBuf;
use std::time::Duration;

use lunet_core::defaults::{
    DEFAULT_LEDGER_BUSY_TIMEOUT_SECS, DEFAULT_LEDGER_MAX_CONNECTIONS, DEFAULT_LEDGER_URL,
};
use serde::{Deserialize, Serialize};

/// Ledger storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite URL, e.g. `sqlite:/var/lib/lunet/traffic.sqlite` or `sqlite::memory:`.
    pub url: String,
    pub max_connections: u32,
    /// How long a writer waits on a locked database file.
    pub busy_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_LEDGER_URL.to_string(),
            max_connections: DEFAULT_LEDGER_MAX_CONNECTIONS,
            busy_timeout_secs: DEFAULT_LEDGER_BUSY_TIMEOUT_SECS,
        }
    }
}

impl LedgerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Accept a bare filesystem path as well as a `sqlite:` URL.
    pub fn from_path_or_url(value: &str) -> Self {
        if value.starts_with("sqlite:") {
            Self::new(value)
        } else {
            Self::new(format!("sqlite:{value}"))
        }
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }

    pub fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    /// Database file path for file-backed URLs.
    pub fn file_path(&self) -> Option<PathBuf> {
        if self.is_memory() {
            return None;
        }
        let rest = self.url.strip_prefix("sqlite:")?;
        let rest = rest.strip_prefix("//").unwrap_or(rest);
        let path = rest.split('?').next().unwrap_or_default();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_path_forms() {
        assert_eq!(
            LedgerConfig::new("sqlite:/var/lib/lunet/t.sqlite").file_path(),
            Some(PathBuf::from("/var/lib/lunet/t.sqlite"))
        );
        assert_eq!(
            LedgerConfig::new("sqlite:///data/t.sqlite?mode=rwc").file_path(),
            Some(PathBuf::from("/data/t.sqlite"))
        );
        assert_eq!(LedgerConfig::new("sqlite::memory:").file_path(), None);
    }

    #[test]
    fn bare_path_becomes_url() {
        assert_eq!(
            LedgerConfig::from_path_or_url("/tmp/traffic.sqlite").url,
            "sqlite:/tmp/traffic.sqlite"
        );
        assert_eq!(
            LedgerConfig::from_path_or_url("sqlite::memory:").url,
            "sqlite::memory:"
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: LedgerConfig = serde_json::from_str(r#"{"url":"sqlite::memory:"}"#).unwrap();
        assert_eq!(cfg.max_connections, DEFAULT_LEDGER_MAX_CONNECTIONS);
        assert_eq!(cfg.busy_timeout(), Duration::from_secs(30));
    }
}
