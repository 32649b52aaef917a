//! Provisioning seam between the reconciler and the control plane.

use std::sync::Arc;

use async_trait::async_trait;
use lunet_xray::{ControlPlane, XrayError, is_already_exists_error};
use serde::Serialize;

/// Adds and removes users on the live proxy.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn add_user(&self, email: &str, level: u32, uid: &str) -> Result<String, XrayError>;

    async fn remove_user(&self, email: &str) -> Result<String, XrayError>;
}

#[async_trait]
impl Provisioner for ControlPlane {
    async fn add_user(&self, email: &str, level: u32, uid: &str) -> Result<String, XrayError> {
        ControlPlane::add_user(self, email, level, uid).await
    }

    async fn remove_user(&self, email: &str) -> Result<String, XrayError> {
        ControlPlane::remove_user(self, email).await
    }
}

#[async_trait]
impl<P: Provisioner + ?Sized> Provisioner for Arc<P> {
    async fn add_user(&self, email: &str, level: u32, uid: &str) -> Result<String, XrayError> {
        (**self).add_user(email, level, uid).await
    }

    async fn remove_user(&self, email: &str) -> Result<String, XrayError> {
        (**self).remove_user(email).await
    }
}

/// Classified result of one provisioning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionOutcome {
    Ok,
    Already,
    Error,
}

impl ProvisionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Already => "already",
            Self::Error => "error",
        }
    }

    /// Whether the identity is provisioned afterwards.
    pub fn is_synced(self) -> bool {
        matches!(self, Self::Ok | Self::Already)
    }
}

/// Classify an `add_user` result.
pub fn classify_provision<T>(result: &Result<T, XrayError>) -> ProvisionOutcome {
    match result {
        Ok(_) => ProvisionOutcome::Ok,
        Err(e) if is_already_exists_error(&e.detail()) => ProvisionOutcome::Already,
        Err(_) => ProvisionOutcome::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_results() {
        let ok: Result<(), XrayError> = Ok(());
        assert_eq!(classify_provision(&ok), ProvisionOutcome::Ok);

        let already: Result<(), XrayError> = Err(XrayError::Rejected {
            program: "grpcurl".into(),
            detail: "rpc error: already EXISTS".into(),
        });
        assert_eq!(classify_provision(&already), ProvisionOutcome::Already);

        let other: Result<(), XrayError> = Err(XrayError::Rejected {
            program: "grpcurl".into(),
            detail: "Error: USER_ALREADY_EXISTS for email x".into(),
        });
        assert_eq!(classify_provision(&other), ProvisionOutcome::Error);
        assert!(!ProvisionOutcome::Error.is_synced());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ProvisionOutcome::Already).unwrap(),
            "\"already\""
        );
    }
}
