//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Control Plane Defaults
// ============================================================================

/// Default address of the proxy's management API.
pub const DEFAULT_XRAY_ADDR: &str = "127.0.0.1:10085";
/// Default inbound tag users are attached to.
pub const DEFAULT_INBOUND_TAG: &str = "vless-reality-in";
/// Default grpcurl binary.
pub const DEFAULT_GRPCURL_BIN: &str = "/usr/local/bin/grpcurl";
/// Default protoc binary.
pub const DEFAULT_PROTOC_BIN: &str = "/usr/bin/protoc";
/// Default xray binary (used for the `xray api` CLI fallbacks).
pub const DEFAULT_XRAY_BIN: &str = "/usr/local/bin/xray";
/// Default root of the xray `.proto` tree.
pub const DEFAULT_PROTO_ROOT: &str = "/opt/xray-protos";
/// Default protoset file name, relative to the proto root.
pub const DEFAULT_PROTOSET_NAME: &str = "xray.protoset";
/// Default per-command timeout in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Stats Defaults
// ============================================================================

/// Default lifetime of a cached bulk stats snapshot in milliseconds.
pub const DEFAULT_SNAPSHOT_TTL_MS: u64 = 1000;
/// Upper bound on the bulk snapshot lifetime in milliseconds.
pub const MAX_SNAPSHOT_TTL_MS: u64 = 1000;
/// Default activity window for online inference in seconds.
pub const DEFAULT_ACTIVITY_WINDOW_SECS: u64 = 60;
/// Lowest accepted activity window in seconds.
pub const MIN_ACTIVITY_WINDOW_SECS: u64 = 15;
/// Default maximum number of identities tracked by the online tracker.
pub const DEFAULT_ONLINE_TRACKER_CAPACITY: usize = 16_384;
/// Default idle age (seconds) after which tracker entries may be evicted.
pub const DEFAULT_ONLINE_TRACKER_RETENTION_SECS: u64 = 86_400;

// ============================================================================
// Ledger Defaults
// ============================================================================

/// Default SQLite URL for the traffic ledger.
pub const DEFAULT_LEDGER_URL: &str = "sqlite:/var/lib/lunet/traffic.sqlite";
/// Default ledger connection pool size.
pub const DEFAULT_LEDGER_MAX_CONNECTIONS: u32 = 4;
/// Default SQLite busy timeout in seconds.
pub const DEFAULT_LEDGER_BUSY_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Sync Defaults
// ============================================================================

/// Default server scope id.
pub const DEFAULT_SERVER_ID: i64 = 1;
/// Default domain of derived identity strings.
pub const DEFAULT_IDENTITY_DOMAIN: &str = "lunet";
/// Default user level for provisioned identities.
pub const DEFAULT_USER_LEVEL: u32 = 0;
/// Default number of startup sync attempts.
pub const DEFAULT_STARTUP_SYNC_ATTEMPTS: u32 = 3;
/// Default delay between startup sync attempts in milliseconds.
pub const DEFAULT_STARTUP_SYNC_BACKOFF_MS: u64 = 2000;

// ============================================================================
// Collector Defaults
// ============================================================================

/// Default interval between periodic ledger refreshes in seconds.
pub const DEFAULT_COLLECTOR_INTERVAL_SECS: u64 = 60;
