//! Convergence of the proxy's provisioned users to the identity registry.
//!
//! [`Reconciler`] reads the active identities of one server scope from an
//! [`IdentityRegistry`] and provisions each through a [`Provisioner`].
//! Provisioning is idempotent: "already exists" counts as synced.

mod config;
mod error;
mod provisioner;
mod reconciler;
mod registry;

pub use config::SyncConfig;
pub use error::SyncError;
pub use provisioner::{ProvisionOutcome, Provisioner, classify_provision};
pub use reconciler::{Reconciler, ResyncReport, SyncItem};
pub use registry::{IdentityRegistry, MemoryRegistry, SqlRegistry};
