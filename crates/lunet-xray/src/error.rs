//! Control-plane error types.

use std::time::Duration;

/// Control-plane error.
#[derive(Debug, thiserror::Error)]
pub enum XrayError {
    /// The tool could not be started, or every transport was exhausted.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The per-call deadline elapsed.
    #[error("{program} timed out after {after:?}")]
    Timeout { program: String, after: Duration },

    /// The tool ran and exited non-zero.
    #[error("{program} failed: {detail}")]
    Rejected { program: String, detail: String },

    /// The schema-aware encoder failed.
    #[error("encoding {type_name} failed: {detail}")]
    Encoding { type_name: String, detail: String },

    /// A field value was refused before message construction.
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Tool output could not be decoded.
    #[error("decode: {0}")]
    Decode(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl XrayError {
    /// Raw diagnostic text, as the failing tool reported it.
    ///
    /// Classifiers such as [`is_already_exists_error`](crate::is_already_exists_error)
    /// match against this rather than the formatted message.
    pub fn detail(&self) -> String {
        match self {
            Self::Rejected { detail, .. } | Self::Encoding { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the failure happened below the proxy (no answer was received).
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::TransportUnavailable(_) | Self::Timeout { .. })
    }

    /// Error kind label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransportUnavailable(_) => lunet_core::ERROR_TRANSPORT,
            Self::Timeout { .. } => lunet_core::ERROR_TIMEOUT,
            Self::Rejected { .. } => lunet_core::ERROR_REJECTED,
            Self::Encoding { .. } => lunet_core::ERROR_ENCODING,
            Self::InvalidField { .. } => lunet_core::ERROR_INVALID_FIELD,
            Self::Decode(_) | Self::Json(_) => lunet_core::ERROR_DECODE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_is_raw_stderr_for_rejected() {
        let e = XrayError::Rejected {
            program: "grpcurl".into(),
            detail: "rpc error: already exists".into(),
        };
        assert_eq!(e.detail(), "rpc error: already exists");
        assert_eq!(e.kind(), "rejected");
        assert!(!e.is_transport_failure());
    }

    #[test]
    fn timeout_is_transport_failure() {
        let e = XrayError::Timeout {
            program: "grpcurl".into(),
            after: Duration::from_secs(3),
        };
        assert!(e.is_transport_failure());
        assert_eq!(e.kind(), "timeout");
    }
}
