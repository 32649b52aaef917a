//! Ledger table and statements.

pub const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS vpn_user_traffic_snapshot (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    email TEXT NOT NULL DEFAULT '',
    last_uplink INTEGER NOT NULL DEFAULT 0,
    last_downlink INTEGER NOT NULL DEFAULT 0,
    total_uplink INTEGER NOT NULL DEFAULT 0,
    total_downlink INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    UNIQUE(server_id, user_id)
)
"#;

pub const CREATE_INDEX_SERVER: &str = r#"
CREATE INDEX IF NOT EXISTS ix_vpn_user_traffic_snapshot_server_id
ON vpn_user_traffic_snapshot(server_id)
"#;

pub const CREATE_INDEX_USER: &str = r#"
CREATE INDEX IF NOT EXISTS ix_vpn_user_traffic_snapshot_user_id
ON vpn_user_traffic_snapshot(user_id)
"#;

pub const SELECT_ROW: &str = r#"
SELECT last_uplink, last_downlink, total_uplink, total_downlink
FROM vpn_user_traffic_snapshot
WHERE server_id = ? AND user_id = ?
"#;

pub const SELECT_TOTALS: &str = r#"
SELECT total_uplink, total_downlink
FROM vpn_user_traffic_snapshot
WHERE server_id = ? AND user_id = ?
"#;

pub const INSERT_ROW: &str = r#"
INSERT INTO vpn_user_traffic_snapshot (
    server_id, user_id, email, last_uplink, last_downlink,
    total_uplink, total_downlink, updated_at
) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

pub const UPDATE_ROW: &str = r#"
UPDATE vpn_user_traffic_snapshot
SET email = ?,
    last_uplink = ?,
    last_downlink = ?,
    total_uplink = ?,
    total_downlink = ?,
    updated_at = ?
WHERE server_id = ? AND user_id = ?
"#;

/// Prefix of the reset statement; `server_id` and an optional user list follow.
pub const RESET_PREFIX: &str = "UPDATE vpn_user_traffic_snapshot \
SET last_uplink = 0, last_downlink = 0, total_uplink = 0, total_downlink = 0, updated_at = ";
