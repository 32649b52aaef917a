//! Control-plane configuration.

use std::time::Duration;

use lunet_core::defaults;
use serde::{Deserialize, Serialize};

/// Where the proxy's management API lives and which tools talk to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XrayConfig {
    /// Management API address, e.g. `127.0.0.1:10085`.
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Inbound tag users are attached to.
    #[serde(default = "default_inbound_tag")]
    pub inbound_tag: String,
    #[serde(default = "default_grpcurl_bin")]
    pub grpcurl_bin: String,
    #[serde(default = "default_protoc_bin")]
    pub protoc_bin: String,
    /// xray binary used for the `xray api` CLI fallbacks.
    #[serde(default = "default_xray_bin")]
    pub xray_bin: String,
    /// Root of the `.proto` tree used by the encoder.
    #[serde(default = "default_proto_root")]
    pub proto_root: String,
    /// Compiled descriptor set for grpcurl. Defaults to `<proto_root>/xray.protoset`.
    #[serde(default)]
    pub protoset: Option<String>,
    /// Per-command deadline in seconds.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Lifetime of the cached bulk stats snapshot (capped at 1000ms).
    #[serde(default = "default_snapshot_ttl_ms")]
    pub snapshot_ttl_ms: u64,
}

impl Default for XrayConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            inbound_tag: default_inbound_tag(),
            grpcurl_bin: default_grpcurl_bin(),
            protoc_bin: default_protoc_bin(),
            xray_bin: default_xray_bin(),
            proto_root: default_proto_root(),
            protoset: None,
            command_timeout_secs: default_command_timeout_secs(),
            snapshot_ttl_ms: default_snapshot_ttl_ms(),
        }
    }
}

impl XrayConfig {
    /// Resolved protoset path.
    pub fn protoset_path(&self) -> String {
        self.protoset.clone().unwrap_or_else(|| {
            format!(
                "{}/{}",
                self.proto_root.trim_end_matches('/'),
                defaults::DEFAULT_PROTOSET_NAME
            )
        })
    }

    /// Per-command deadline.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Bulk snapshot lifetime, never above one second.
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_millis(self.snapshot_ttl_ms.min(defaults::MAX_SNAPSHOT_TTL_MS))
    }
}

fn default_addr() -> String {
    defaults::DEFAULT_XRAY_ADDR.to_string()
}

fn default_inbound_tag() -> String {
    defaults::DEFAULT_INBOUND_TAG.to_string()
}

fn default_grpcurl_bin() -> String {
    defaults::DEFAULT_GRPCURL_BIN.to_string()
}

fn default_protoc_bin() -> String {
    defaults::DEFAULT_PROTOC_BIN.to_string()
}

fn default_xray_bin() -> String {
    defaults::DEFAULT_XRAY_BIN.to_string()
}

fn default_proto_root() -> String {
    defaults::DEFAULT_PROTO_ROOT.to_string()
}

fn default_command_timeout_secs() -> u64 {
    defaults::DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_snapshot_ttl_ms() -> u64 {
    defaults::DEFAULT_SNAPSHOT_TTL_MS
}
