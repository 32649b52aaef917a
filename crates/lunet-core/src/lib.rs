//! Core types and constants shared across lunet crates.
//!
//! This crate provides:
//! - Default configuration values
//! - Error kind constants for metrics/logging
//! - The identity model and the identity-string derivation

pub mod defaults;
pub mod errors;
pub mod identity;

// Re-export commonly used items at crate root
pub use defaults::*;
pub use errors::*;
pub use identity::{
    ActiveIdentity, Identity, IdentityStatus, identity_for_user, user_id_from_identity,
};

/// Project name.
pub const PROJECT_NAME: &str = "lunet-rs";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
