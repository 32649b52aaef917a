//! Control-plane codec for the xray management API.
//!
//! Builds binary control-plane messages from structured fields (through
//! `protoc --encode`) and invokes management RPCs over an ordered chain
//! of transports (grpcurl with a protoset, then server reflection).
//!
//! # Example
//!
//! ```ignore
//! use lunet_xray::{ControlPlane, XrayConfig};
//!
//! let control = ControlPlane::with_process_runner(XrayConfig::default());
//! match control.add_user("user-10@lunet", 0, "9c7a3d2f-...").await {
//!     Ok(_) => {}
//!     Err(e) if lunet_xray::is_already_exists_error(&e.detail()) => {}
//!     Err(e) => return Err(e),
//! }
//! ```

mod classify;
mod codec;
mod config;
mod control;
mod error;
mod runner;
mod text;

#[cfg(any(test, feature = "testing"))]
pub mod scripted;

pub use classify::{is_already_exists_error, is_stat_missing_error, is_unsupported_error};
pub use codec::{INCLUDE_SUBDIRS, ProtoEncoder, b64, hex_escape};
pub use config::XrayConfig;
pub use control::{
    ADD_USER_OPERATION, ALTER_INBOUND, COMMAND_PROTO, ControlPlane, REMOVE_USER_OPERATION,
    RpcTransport, VLESS_ACCOUNT, VLESS_ACCOUNT_PROTO,
};
pub use error::XrayError;
pub use runner::{CommandRunner, CommandSpec, ProcessRunner};
pub use text::TextMessage;
