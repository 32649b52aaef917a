//! Failure classifiers over raw tool diagnostics.
//!
//! All matching is case-insensitive substring matching.

/// Idempotency classifier for provisioning failures.
///
/// Only the literal phrase "already exists" matches; `USER_ALREADY_EXISTS`
/// does not.
pub fn is_already_exists_error(detail: &str) -> bool {
    detail.to_lowercase().contains("already exists")
}

/// Whether a stats failure means the counter was never created upstream.
pub fn is_stat_missing_error(detail: &str) -> bool {
    let low = detail.to_lowercase();
    low.contains("not found") || low.contains("notfound") || low.contains("unknown stat")
}

/// Whether the running proxy (or the chosen transport) does not expose
/// the requested RPC service at all.
pub fn is_unsupported_error(detail: &str) -> bool {
    const MARKERS: &[&str] = &[
        "does not expose service",
        "unimplemented",
        "unknown service",
        "does not support the reflection api",
        "failed to resolve symbol",
        "failed to process proto",
    ];
    let low = detail.to_lowercase();
    MARKERS.iter().any(|m| low.contains(m))
}
