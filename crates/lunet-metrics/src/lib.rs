//! Metrics collection and Prometheus exporter for lunet-rs.
//!
//! Covers external command invocations, stat probe fallbacks, ledger
//! writes and provisioning outcomes.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize Prometheus metrics exporter.
///
/// Starts an HTTP server on the given address to expose metrics.
/// Returns an error message if binding fails.
pub fn init_prometheus(listen: &str) -> Result<(), String> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| format!("invalid metrics listen address: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install prometheus exporter: {}", e))?;

    Ok(())
}

// ============================================================================
// Metric Names
// ============================================================================

/// External command invocations by program and outcome.
pub const COMMANDS_TOTAL: &str = "lunet_commands_total";
/// External command duration histogram (seconds).
pub const COMMAND_DURATION_SECONDS: &str = "lunet_command_duration_seconds";
/// Stat probes that failed over to the next probe in the chain.
pub const PROBE_FALLBACKS_TOTAL: &str = "lunet_probe_fallbacks_total";
/// Stat reads answered as missing (counter not yet created upstream).
pub const STAT_MISSING_TOTAL: &str = "lunet_stat_missing_total";
/// Stat reads served from the bulk snapshot cache.
pub const SNAPSHOT_HITS_TOTAL: &str = "lunet_snapshot_hits_total";
/// Upstream counter resets detected while folding readings into the ledger.
pub const COUNTER_RESETS_TOTAL: &str = "lunet_counter_resets_total";
/// Ledger writes by kind.
pub const LEDGER_WRITES_TOTAL: &str = "lunet_ledger_writes_total";
/// Provisioning results by class (ok, already, error).
pub const PROVISION_RESULTS_TOTAL: &str = "lunet_provision_results_total";
/// Identities currently considered online.
pub const ONLINE_USERS: &str = "lunet_online_users";
/// Entries held by the online tracker.
pub const ONLINE_TRACKER_ENTRIES: &str = "lunet_online_tracker_entries";

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record one external command invocation.
#[inline]
pub fn record_command(program: &str, outcome: &'static str, duration_secs: f64) {
    let program = program.to_string();
    counter!(COMMANDS_TOTAL, "program" => program.clone(), "outcome" => outcome).increment(1);
    histogram!(COMMAND_DURATION_SECONDS, "program" => program).record(duration_secs);
}

/// Record a probe giving way to the next one.
#[inline]
pub fn record_probe_fallback(probe: &'static str) {
    counter!(PROBE_FALLBACKS_TOTAL, "probe" => probe).increment(1);
}

/// Record a stat answered as missing.
#[inline]
pub fn record_stat_missing() {
    counter!(STAT_MISSING_TOTAL).increment(1);
}

/// Record a stat served from the bulk snapshot.
#[inline]
pub fn record_snapshot_hit() {
    counter!(SNAPSHOT_HITS_TOTAL).increment(1);
}

/// Record an upstream counter reset (direction: "uplink" or "downlink").
#[inline]
pub fn record_counter_reset(direction: &'static str) {
    counter!(COUNTER_RESETS_TOTAL, "direction" => direction).increment(1);
}

/// Record a ledger write (kind: "insert", "update", "reset", "bulk").
#[inline]
pub fn record_ledger_write(kind: &'static str) {
    counter!(LEDGER_WRITES_TOTAL, "kind" => kind).increment(1);
}

/// Record a provisioning result class.
#[inline]
pub fn record_provision_result(result: &'static str) {
    counter!(PROVISION_RESULTS_TOTAL, "result" => result).increment(1);
}

/// Set the number of identities currently online.
#[inline]
pub fn set_online_users(count: usize) {
    gauge!(ONLINE_USERS).set(count as f64);
}

/// Set the number of entries held by the online tracker.
#[inline]
pub fn set_online_tracker_entries(count: usize) {
    gauge!(ONLINE_TRACKER_ENTRIES).set(count as f64);
}
