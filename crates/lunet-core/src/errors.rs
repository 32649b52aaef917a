//! Error kind constants for metrics and logging.
//!
//! These constants provide consistent error classification across all crates.

/// Every transport in a fallback chain failed, or a tool could not be spawned.
pub const ERROR_TRANSPORT: &str = "transport";
/// A per-call deadline elapsed.
pub const ERROR_TIMEOUT: &str = "timeout";
/// The external tool ran and reported a failure.
pub const ERROR_REJECTED: &str = "rejected";
/// The schema-aware encoder failed.
pub const ERROR_ENCODING: &str = "encoding";
/// A field value was refused before message construction.
pub const ERROR_INVALID_FIELD: &str = "invalid_field";
/// Tool output could not be decoded.
pub const ERROR_DECODE: &str = "decode";
/// Ledger write or read failed.
pub const ERROR_PERSISTENCE: &str = "persistence";
/// Identity registry lookup failed.
pub const ERROR_REGISTRY: &str = "registry";
/// Configuration error.
pub const ERROR_CONFIG: &str = "config";
