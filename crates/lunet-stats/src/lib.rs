//! Live counter retrieval for the xray stats service.
//!
//! [`StatBridge`] answers traffic and online queries against an
//! inconsistent upstream surface: a short-lived bulk snapshot, direct
//! `GetStats` RPCs under two service namespaces, then `xray api` CLI
//! fallbacks. Counters that do not exist upstream read as zero with
//! `missing` set, never as failures.

mod bridge;
mod decode;
pub mod names;
mod online;
mod probe;
mod types;

pub use bridge::StatBridge;
pub use decode::{decode_single, decode_snapshot};
pub use online::{OnlineTracker, TrackerConfig};
pub use probe::StatProbe;
pub use types::{OnlineStatus, ResetSummary, StatReading, TrafficReading};
