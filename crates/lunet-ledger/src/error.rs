/// Ledger error. Always propagated; an accounting write is never dropped
/// silently.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger persistence failed: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("ledger storage: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid ledger url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl LedgerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => lunet_core::ERROR_CONFIG,
            _ => lunet_core::ERROR_PERSISTENCE,
        }
    }
}
