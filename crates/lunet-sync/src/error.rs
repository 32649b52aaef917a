/// Reconciliation error.
///
/// Per-identity provisioning failures are not errors; they are reported
/// in [`ResyncReport::failed`](crate::ResyncReport).
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The registry query failed.
    #[error("registry error: {0}")]
    Registry(String),

    #[error("registry database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unsupported registry url scheme: {0}")]
    UnsupportedUrl(String),
}

impl SyncError {
    pub fn registry<E: std::fmt::Display>(err: E) -> Self {
        Self::Registry(err.to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedUrl(_) => lunet_core::ERROR_CONFIG,
            _ => lunet_core::ERROR_REGISTRY,
        }
    }
}
