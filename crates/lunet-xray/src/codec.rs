//! Binary payload encoding through `protoc --encode`.

use std::sync::Arc;

use base64::Engine;
use tracing::debug;

use crate::error::XrayError;
use crate::runner::{CommandRunner, CommandSpec};
use crate::text::TextMessage;

/// Include directories under the proto root, in search order.
pub const INCLUDE_SUBDIRS: &[&str] = &["", "common", "app", "proxy", "infra", "transport", "core"];

/// Schema-aware encoder that shells out to `protoc`.
#[derive(Clone)]
pub struct ProtoEncoder {
    runner: Arc<dyn CommandRunner>,
    protoc_bin: String,
    proto_root: String,
}

impl ProtoEncoder {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        protoc_bin: impl Into<String>,
        proto_root: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            protoc_bin: protoc_bin.into(),
            proto_root: proto_root.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build the `protoc` invocation for one message type.
    pub fn command(&self, type_name: &str, schema_path: &str, text: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.protoc_bin).arg(format!("--encode={type_name}"));
        for sub in INCLUDE_SUBDIRS {
            let dir = if sub.is_empty() {
                self.proto_root.clone()
            } else {
                format!("{}/{sub}", self.proto_root)
            };
            spec = spec.arg("-I").arg(dir);
        }
        spec.arg(format!("{}/{schema_path}", self.proto_root))
            .stdin(text.as_bytes())
    }

    /// Encode a structured message.
    pub async fn encode(
        &self,
        type_name: &str,
        message: &TextMessage,
        schema_path: &str,
    ) -> Result<Vec<u8>, XrayError> {
        self.encode_text(type_name, &message.render(), schema_path)
            .await
    }

    /// Encode an already rendered text-format message.
    ///
    /// A non-zero encoder exit becomes [`XrayError::Encoding`] carrying the
    /// encoder's diagnostics.
    pub async fn encode_text(
        &self,
        type_name: &str,
        text: &str,
        schema_path: &str,
    ) -> Result<Vec<u8>, XrayError> {
        let spec = self.command(type_name, schema_path, text);
        match self.runner.run(&spec).await {
            Ok(bytes) => {
                debug!(type_name, len = bytes.len(), "encoded message");
                Ok(bytes)
            }
            Err(XrayError::Rejected { detail, .. }) => Err(XrayError::Encoding {
                type_name: type_name.to_string(),
                detail,
            }),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for ProtoEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtoEncoder")
            .field("protoc_bin", &self.protoc_bin)
            .field("proto_root", &self.proto_root)
            .finish_non_exhaustive()
    }
}

/// Render bytes as `\xHH` escapes, for embedding inside a text literal.
pub fn hex_escape(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4);
    for b in data {
        out.push_str(&format!("\\x{b:02x}"));
    }
    out
}

/// Standard base64, for embedding as an operation envelope value.
pub fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}
