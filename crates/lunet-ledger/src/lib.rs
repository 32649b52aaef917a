//! Cumulative traffic ledger.
//!
//! Raw upstream counters are volatile: they reset to zero whenever the
//! proxy restarts. [`TrafficLedger`] folds each reading into a durable
//! row per `(server_id, user_id)` whose totals never decrease. A reading
//! lower than the previous one is treated as a reset, so the whole
//! reading counts as new traffic.
//!
//! # Example
//!
//! ```ignore
//! use lunet_ledger::{LedgerConfig, TrafficLedger};
//!
//! let ledger = TrafficLedger::connect(&LedgerConfig::default()).await?;
//! ledger.ensure_initialized().await?;
//! let totals = ledger.apply_snapshot(1, 10, "user-10@lunet", 4096, 1 << 20).await?;
//! ```

mod config;
mod error;
mod ledger;
mod merge;
mod schema;

pub use config::LedgerConfig;
pub use error::LedgerError;
pub use ledger::{ResetTarget, SnapshotItem, TrafficLedger};
pub use merge::{Totals, fold_counter};
