//! Management RPC invocation and user provisioning.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::classify::is_unsupported_error;
use crate::codec::{ProtoEncoder, b64};
use crate::config::XrayConfig;
use crate::error::XrayError;
use crate::runner::{CommandRunner, CommandSpec, ProcessRunner};
use crate::text::TextMessage;

/// Full method name of the inbound alteration RPC.
pub const ALTER_INBOUND: &str = "xray.app.proxyman.command.HandlerService/AlterInbound";
/// Operation type carried by an "add user" alteration.
pub const ADD_USER_OPERATION: &str = "xray.app.proxyman.command.AddUserOperation";
/// Operation type carried by a "remove user" alteration.
pub const REMOVE_USER_OPERATION: &str = "xray.app.proxyman.command.RemoveUserOperation";
/// Account message type for VLESS users.
pub const VLESS_ACCOUNT: &str = "xray.proxy.vless.Account";
/// Schema of the proxyman command messages, relative to the proto root.
pub const COMMAND_PROTO: &str = "app/proxyman/command/command.proto";
/// Schema of the VLESS account message, relative to the proto root.
pub const VLESS_ACCOUNT_PROTO: &str = "proxy/vless/account.proto";

/// How grpcurl resolves the RPC schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcTransport {
    /// Compiled descriptor set on disk.
    Protoset,
    /// gRPC server reflection on the proxy.
    Reflection,
}

impl RpcTransport {
    /// Transports in the order they are tried.
    pub const CHAIN: [Self; 2] = [Self::Protoset, Self::Reflection];

    pub fn name(self) -> &'static str {
        match self {
            Self::Protoset => "protoset",
            Self::Reflection => "reflection",
        }
    }

    /// Whether a failure on this transport moves on to the next one.
    ///
    /// Answers from the proxy itself (e.g. "already exists", "stat not
    /// found") stop the chain.
    pub fn advances_on(self, err: &XrayError) -> bool {
        err.is_transport_failure() || is_unsupported_error(&err.detail())
    }
}

/// Client for the proxy's management API.
#[derive(Clone)]
pub struct ControlPlane {
    runner: Arc<dyn CommandRunner>,
    encoder: ProtoEncoder,
    config: XrayConfig,
}

impl ControlPlane {
    pub fn new(config: XrayConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let encoder = ProtoEncoder::new(runner.clone(), &config.protoc_bin, &config.proto_root);
        Self {
            runner,
            encoder,
            config,
        }
    }

    /// Control plane running real processes with the configured deadline.
    pub fn with_process_runner(config: XrayConfig) -> Self {
        let runner = Arc::new(ProcessRunner::new(config.command_timeout()));
        Self::new(config, runner)
    }

    pub fn config(&self) -> &XrayConfig {
        &self.config
    }

    pub fn encoder(&self) -> &ProtoEncoder {
        &self.encoder
    }

    fn grpcurl_command(&self, transport: RpcTransport, method: &str, body: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.config.grpcurl_bin).arg("-plaintext");
        if transport == RpcTransport::Protoset {
            spec = spec.arg("-protoset").arg(self.config.protoset_path());
        }
        spec.arg("-d")
            .arg(body)
            .arg(&self.config.addr)
            .arg(method)
    }

    /// Invoke a management RPC, trying each [`RpcTransport`] in turn.
    ///
    /// Returns the raw textual response. When every transport fails the
    /// last failure is returned.
    pub async fn invoke(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<String, XrayError> {
        let body = payload.to_string();
        let mut last = None;

        for transport in RpcTransport::CHAIN {
            let spec = self.grpcurl_command(transport, method, &body);
            match self.runner.run(&spec).await {
                Ok(out) => return Ok(String::from_utf8_lossy(&out).into_owned()),
                Err(e) if transport.advances_on(&e) => {
                    debug!(
                        method,
                        transport = transport.name(),
                        error = %e,
                        "rpc transport failed, trying next"
                    );
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last.unwrap_or_else(|| {
            XrayError::TransportUnavailable(format!("no transport accepted {method}"))
        }))
    }

    /// Run an `xray api` subcommand against the configured server.
    pub async fn xray_api<I, S>(&self, subcommand: &str, args: I) -> Result<String, XrayError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = CommandSpec::new(&self.config.xray_bin)
            .arg("api")
            .arg(subcommand)
            .arg(format!("--server={}", self.config.addr))
            .args(args);
        let out = self.runner.run(&spec).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn alter_inbound_payload(&self, operation_type: &str, operation: &[u8]) -> serde_json::Value {
        json!({
            "tag": self.config.inbound_tag,
            "operation": {
                "type": operation_type,
                "value": b64(operation),
            }
        })
    }

    /// Attach a VLESS user to the configured inbound.
    ///
    /// Callers must check [`is_already_exists_error`](crate::is_already_exists_error)
    /// before treating a failure as fatal. No retry happens here.
    pub async fn add_user(&self, email: &str, level: u32, uid: &str) -> Result<String, XrayError> {
        let account = TextMessage::new().string("id", uid)?;
        let account_bin = self
            .encoder
            .encode(VLESS_ACCOUNT, &account, VLESS_ACCOUNT_PROTO)
            .await?;

        let user = TextMessage::new()
            .string("email", email)?
            .uint("level", u64::from(level))
            .message(
                "account",
                TextMessage::new()
                    .string("type", VLESS_ACCOUNT)?
                    .bytes("value", &account_bin),
            );
        let operation = TextMessage::new().message("user", user);
        let operation_bin = self
            .encoder
            .encode(ADD_USER_OPERATION, &operation, COMMAND_PROTO)
            .await?;

        let payload = self.alter_inbound_payload(ADD_USER_OPERATION, &operation_bin);
        let out = self.invoke(ALTER_INBOUND, &payload).await?;
        info!(email, tag = %self.config.inbound_tag, "user added to inbound");
        Ok(out)
    }

    /// Detach a user from the configured inbound by email.
    pub async fn remove_user(&self, email: &str) -> Result<String, XrayError> {
        let operation = TextMessage::new().string("email", email)?;
        let operation_bin = self
            .encoder
            .encode(REMOVE_USER_OPERATION, &operation, COMMAND_PROTO)
            .await?;

        let payload = self.alter_inbound_payload(REMOVE_USER_OPERATION, &operation_bin);
        let out = self.invoke(ALTER_INBOUND, &payload).await?;
        info!(email, tag = %self.config.inbound_tag, "user removed from inbound");
        Ok(out)
    }
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("addr", &self.config.addr)
            .field("inbound_tag", &self.config.inbound_tag)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::hex_escape;
    use crate::is_already_exists_error;
    use crate::scripted::{ScriptedRunner, echo_protoc, rejected};

    fn control(runner: Arc<ScriptedRunner>) -> ControlPlane {
        let config = XrayConfig {
            inbound_tag: "vless-in".into(),
            ..Default::default()
        };
        ControlPlane::new(config, runner)
    }

    fn grpcurl_ok(spec: &CommandSpec) -> Option<Result<Vec<u8>, XrayError>> {
        (spec.program_name() == "grpcurl").then(|| Ok(b"{}\n".to_vec()))
    }

    #[tokio::test]
    async fn add_user_builds_nested_envelope() {
        let runner = Arc::new(ScriptedRunner::new().on(echo_protoc).on(grpcurl_ok));
        let out = control(runner.clone())
            .add_user("user-10@lunet", 0, "9c7a3d2f-2b31-4f93-9d8f-3a9cb6a0c8f1")
            .await
            .unwrap();
        assert_eq!(out, "{}\n");

        let protoc = runner.calls_to("protoc");
        assert_eq!(protoc.len(), 2);
        assert_eq!(
            protoc[0].stdin.as_deref(),
            Some(&b"id: \"9c7a3d2f-2b31-4f93-9d8f-3a9cb6a0c8f1\"\n"[..])
        );
        let op_text = String::from_utf8(protoc[1].stdin.clone().unwrap()).unwrap();
        assert!(op_text.contains("email: \"user-10@lunet\""));
        assert!(op_text.contains("type: \"xray.proxy.vless.Account\""));
        assert!(op_text.contains(&format!(
            "value: \"{}\"",
            hex_escape(VLESS_ACCOUNT.as_bytes())
        )));

        let grpc = runner.calls_to("grpcurl");
        assert_eq!(grpc.len(), 1);
        assert!(grpc[0].has_arg("-protoset"));
        assert_eq!(grpc[0].args.last().map(String::as_str), Some(ALTER_INBOUND));
        let payload: serde_json::Value =
            serde_json::from_str(grpc[0].arg_after("-d").unwrap()).unwrap();
        assert_eq!(payload["tag"], "vless-in");
        assert_eq!(payload["operation"]["type"], ADD_USER_OPERATION);
        assert_eq!(payload["operation"]["value"], b64(ADD_USER_OPERATION.as_bytes()));
    }

    #[tokio::test]
    async fn remove_user_keys_on_email_only() {
        let runner = Arc::new(ScriptedRunner::new().on(echo_protoc).on(grpcurl_ok));
        control(runner.clone())
            .remove_user("user-3@lunet")
            .await
            .unwrap();

        let protoc = runner.calls_to("protoc");
        assert_eq!(protoc.len(), 1);
        assert_eq!(protoc[0].args[0], format!("--encode={REMOVE_USER_OPERATION}"));
        assert_eq!(protoc[0].stdin.as_deref(), Some(&b"email: \"user-3@lunet\"\n"[..]));
    }

    #[tokio::test]
    async fn already_exists_stops_the_chain() {
        let runner = Arc::new(ScriptedRunner::new().on(echo_protoc).on(|spec| {
            (spec.program_name() == "grpcurl").then(|| {
                rejected(
                    "grpcurl",
                    "ERROR:\n  Code: Unknown\n  Message: app/proxyman/command: failed to add user > proxy/vless/inbound: User user-10@lunet already exists.",
                )
            })
        }));
        let err = control(runner.clone())
            .add_user("user-10@lunet", 0, "uuid-10")
            .await
            .unwrap_err();
        assert!(is_already_exists_error(&err.detail()));
        assert_eq!(runner.calls_to("grpcurl").len(), 1);
    }

    #[tokio::test]
    async fn unsupported_protoset_falls_back_to_reflection() {
        let runner = Arc::new(ScriptedRunner::new().on(echo_protoc).on(|spec| {
            if spec.program_name() != "grpcurl" {
                return None;
            }
            if spec.has_arg("-protoset") {
                Some(rejected(
                    "grpcurl",
                    "Failed to resolve symbol \"xray.app.proxyman.command.HandlerService\"",
                ))
            } else {
                Some(Ok(b"{}".to_vec()))
            }
        }));
        control(runner.clone())
            .add_user("user-11@lunet", 0, "uuid-11")
            .await
            .unwrap();
        let grpc = runner.calls_to("grpcurl");
        assert_eq!(grpc.len(), 2);
        assert!(!grpc[1].has_arg("-protoset"));
    }

    #[tokio::test]
    async fn exhausted_chain_returns_last_failure() {
        let runner = Arc::new(ScriptedRunner::new().on(echo_protoc));
        let err = control(runner.clone())
            .remove_user("user-1@lunet")
            .await
            .unwrap_err();
        assert!(matches!(err, XrayError::TransportUnavailable(_)));
        assert_eq!(runner.calls_to("grpcurl").len(), 2);
    }

    #[tokio::test]
    async fn injected_email_never_reaches_a_process() {
        let runner = Arc::new(ScriptedRunner::new().on(echo_protoc).on(grpcurl_ok));
        let err = control(runner.clone())
            .add_user("x\"\n}\nuser {\n  email: \"evil", 0, "uuid")
            .await
            .unwrap_err();
        assert!(matches!(err, XrayError::InvalidField { field: "email", .. }));
        // only the account message was encoded
        assert_eq!(runner.calls_to("protoc").len(), 1);
        assert!(runner.calls_to("grpcurl").is_empty());
    }

    #[tokio::test]
    async fn xray_api_targets_configured_server() {
        let runner = Arc::new(ScriptedRunner::new().on(|spec| {
            (spec.program_name() == "xray").then(|| Ok(b"{\"stat\":[]}".to_vec()))
        }));
        let out = control(runner.clone())
            .xray_api("statsquery", ["-pattern", ""])
            .await
            .unwrap();
        assert_eq!(out, "{\"stat\":[]}");
        let call = &runner.calls_to("xray")[0];
        assert_eq!(
            call.args,
            vec!["api", "statsquery", "--server=127.0.0.1:10085", "-pattern", ""]
        );
    }
}
