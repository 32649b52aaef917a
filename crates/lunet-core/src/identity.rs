//! Identity model shared by the registry, the reconciler and the stat bridge.

use serde::{Deserialize, Serialize};

/// Registry status of a provisioned identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Active,
    Deleted,
}

impl IdentityStatus {
    /// Parse the registry's textual status (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("active") {
            Some(Self::Active)
        } else if s.eq_ignore_ascii_case("deleted") {
            Some(Self::Deleted)
        } else {
            None
        }
    }
}

/// A registry row, as declared by the external identity registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub server_id: i64,
    pub user_id: i64,
    pub uuid: String,
    pub status: IdentityStatus,
}

/// An active identity resolved for one server scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveIdentity {
    pub user_id: i64,
    pub uuid: String,
    /// Derived identity string (the proxy-side user email).
    pub identity: String,
}

impl ActiveIdentity {
    /// Build an active identity, deriving its identity string.
    pub fn new(user_id: i64, uuid: impl Into<String>, domain: &str) -> Self {
        Self {
            user_id,
            uuid: uuid.into(),
            identity: identity_for_user(user_id, domain),
        }
    }
}

/// Derive the proxy-side identity string for a registry user.
///
/// ```
/// assert_eq!(lunet_core::identity_for_user(10, "lunet"), "user-10@lunet");
/// ```
pub fn identity_for_user(user_id: i64, domain: &str) -> String {
    format!("user-{user_id}@{domain}")
}

/// Inverse of [`identity_for_user`]: the user id of a derived identity
/// string under `domain`.
pub fn user_id_from_identity(identity: &str, domain: &str) -> Option<i64> {
    identity
        .strip_prefix("user-")?
        .strip_suffix(domain)?
        .strip_suffix('@')?
        .parse()
        .ok()
}
