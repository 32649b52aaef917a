//! Ledger tests on real SQLite.

use std::sync::Arc;

use super::{ResetTarget, SnapshotItem, TrafficLedger};
use crate::config::LedgerConfig;
use crate::merge::Totals;

async fn memory_ledger() -> TrafficLedger {
    let config = LedgerConfig::new("sqlite::memory:").max_connections(1);
    let ledger = TrafficLedger::connect(&config).await.expect("connect");
    ledger.ensure_initialized().await.expect("schema");
    ledger
}

fn item(user_id: i64, uplink: i64, downlink: i64, available: bool) -> SnapshotItem {
    SnapshotItem {
        user_id,
        email: format!("user-{user_id}@lunet"),
        uplink,
        downlink,
        available,
    }
}

async fn last_counters(ledger: &TrafficLedger, server_id: i64, user_id: i64) -> (i64, i64) {
    sqlx::query_as(
        "SELECT last_uplink, last_downlink FROM vpn_user_traffic_snapshot WHERE server_id = ? AND user_id = ?",
    )
    .bind(server_id)
    .bind(user_id)
    .fetch_one(ledger.pool())
    .await
    .expect("row")
}

#[tokio::test]
async fn first_snapshot_seeds_totals() {
    let ledger = memory_ledger().await;
    let totals = ledger.apply_snapshot(1, 10, "user-10@lunet", 300, 700).await.unwrap();
    assert_eq!(totals, Totals::new(300, 700));
    assert_eq!(totals.total, 1000);
    assert_eq!(ledger.get_totals(1, 10).await.unwrap(), totals);
}

#[tokio::test]
async fn totals_never_decrease() {
    let ledger = memory_ledger().await;
    // deterministic LCG so failures reproduce
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = || {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        ((seed >> 33) % 10_000) as i64
    };

    let mut prev = Totals::default();
    for _ in 0..200 {
        let totals = ledger
            .apply_snapshot(1, 7, "user-7@lunet", next(), next())
            .await
            .unwrap();
        assert!(totals.uplink >= prev.uplink, "{totals:?} < {prev:?}");
        assert!(totals.downlink >= prev.downlink, "{totals:?} < {prev:?}");
        prev = totals;
    }
}

#[tokio::test]
async fn lower_reading_counts_as_fresh_traffic() {
    let ledger = memory_ledger().await;
    ledger.apply_snapshot(1, 1, "user-1@lunet", 500, 500).await.unwrap();
    let before = ledger.apply_snapshot(1, 1, "user-1@lunet", 800, 900).await.unwrap();
    assert_eq!(before, Totals::new(800, 900));

    let after = ledger.apply_snapshot(1, 1, "user-1@lunet", 120, 0).await.unwrap();
    assert_eq!(after, Totals::new(920, 900));
    assert_eq!(last_counters(&ledger, 1, 1).await, (120, 0));
}

#[tokio::test]
async fn replaying_a_reading_adds_nothing() {
    let ledger = memory_ledger().await;
    ledger.apply_snapshot(1, 2, "user-2@lunet", 40, 60).await.unwrap();
    let first = ledger.apply_snapshot(1, 2, "user-2@lunet", 90, 60).await.unwrap();
    let second = ledger.apply_snapshot(1, 2, "user-2@lunet", 90, 60).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn negative_readings_are_clamped() {
    let ledger = memory_ledger().await;
    let totals = ledger.apply_snapshot(1, 3, "user-3@lunet", -50, 10).await.unwrap();
    assert_eq!(totals, Totals::new(0, 10));
}

#[tokio::test]
async fn unknown_key_reads_zero() {
    let ledger = memory_ledger().await;
    assert_eq!(
        ledger.get_totals(9, 999).await.unwrap(),
        Totals {
            uplink: 0,
            downlink: 0,
            total: 0
        }
    );
}

#[tokio::test]
async fn rows_are_scoped_by_server() {
    let ledger = memory_ledger().await;
    ledger.apply_snapshot(1, 5, "user-5@lunet", 10, 10).await.unwrap();
    ledger.apply_snapshot(2, 5, "user-5@lunet", 99, 1).await.unwrap();
    assert_eq!(ledger.get_totals(1, 5).await.unwrap().total, 20);
    assert_eq!(ledger.get_totals(2, 5).await.unwrap().total, 100);
}

#[tokio::test]
async fn bulk_unavailable_item_keeps_last_counters() {
    let ledger = memory_ledger().await;
    ledger.apply_snapshot(1, 1, "user-1@lunet", 400, 400).await.unwrap();

    let out = ledger
        .apply_snapshots_bulk(1, &[item(1, 9_999, 9_999, false), item(2, 50, 50, true)])
        .await
        .unwrap();

    assert_eq!(out[&1], Totals::new(400, 400));
    assert_eq!(out[&2], Totals::new(50, 50));
    assert_eq!(last_counters(&ledger, 1, 1).await, (400, 400));

    // a later good reading folds in as if the outage never happened
    let next = ledger.apply_snapshot(1, 1, "user-1@lunet", 450, 400).await.unwrap();
    assert_eq!(next, Totals::new(450, 400));
}

#[tokio::test]
async fn bulk_unavailable_item_creates_empty_row() {
    let ledger = memory_ledger().await;
    let out = ledger
        .apply_snapshots_bulk(1, &[item(4, 123, 456, false)])
        .await
        .unwrap();
    assert_eq!(out[&4], Totals::default());
    assert_eq!(last_counters(&ledger, 1, 4).await, (0, 0));
}

#[tokio::test]
async fn bulk_repeated_user_folds_in_order() {
    let ledger = memory_ledger().await;
    let out = ledger
        .apply_snapshots_bulk(1, &[item(6, 100, 0, true), item(6, 30, 0, true)])
        .await
        .unwrap();
    // second reading is lower: a reset on top of the first
    assert_eq!(out[&6], Totals::new(130, 0));
}

#[tokio::test]
async fn bulk_with_no_items_is_a_noop() {
    let ledger = memory_ledger().await;
    assert!(ledger.apply_snapshots_bulk(1, &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn reset_selected_users() {
    let ledger = memory_ledger().await;
    for user in 1..=3 {
        ledger
            .apply_snapshot(1, user, &format!("user-{user}@lunet"), 100, 100)
            .await
            .unwrap();
    }
    ledger.apply_snapshot(2, 1, "user-1@lunet", 100, 100).await.unwrap();

    let rows = ledger
        .reset_users(1, ResetTarget::Users(vec![1, 3]))
        .await
        .unwrap();
    assert_eq!(rows, 2);
    assert_eq!(ledger.get_totals(1, 1).await.unwrap(), Totals::default());
    assert_eq!(ledger.get_totals(1, 2).await.unwrap().total, 200);
    assert_eq!(last_counters(&ledger, 1, 3).await, (0, 0));
    assert_eq!(ledger.get_totals(2, 1).await.unwrap().total, 200);

    assert_eq!(ledger.reset_users(1, ResetTarget::Users(vec![])).await.unwrap(), 0);
}

#[tokio::test]
async fn reset_whole_server() {
    let ledger = memory_ledger().await;
    ledger.apply_snapshot(1, 1, "user-1@lunet", 5, 5).await.unwrap();
    ledger.apply_snapshot(1, 2, "user-2@lunet", 5, 5).await.unwrap();
    ledger.apply_snapshot(2, 1, "user-1@lunet", 5, 5).await.unwrap();

    assert_eq!(ledger.reset_users(1, ResetTarget::All).await.unwrap(), 2);
    assert_eq!(ledger.get_totals(1, 2).await.unwrap(), Totals::default());
    assert_eq!(ledger.get_totals(2, 1).await.unwrap().total, 10);

    // after a reset the next reading starts a new history
    let totals = ledger.apply_snapshot(1, 1, "user-1@lunet", 7, 0).await.unwrap();
    assert_eq!(totals, Totals::new(7, 0));
}

#[tokio::test]
async fn initialization_is_idempotent() {
    let ledger = memory_ledger().await;
    for _ in 0..3 {
        ledger.ensure_initialized().await.unwrap();
    }
    ledger.apply_snapshot(1, 1, "user-1@lunet", 1, 1).await.unwrap();
}

#[tokio::test]
async fn concurrent_writers_are_serialized() {
    let ledger = Arc::new(memory_ledger().await);
    let mut handles = Vec::new();
    for user in 0..16_i64 {
        for _ in 0..4 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .apply_snapshot(1, user, &format!("user-{user}@lunet"), user * 10, user)
                    .await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    for user in 0..16_i64 {
        assert_eq!(
            ledger.get_totals(1, user).await.unwrap(),
            Totals::new(user * 10, user)
        );
    }
}

#[tokio::test]
async fn file_backed_ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("traffic.sqlite");
    let config = LedgerConfig::from_path_or_url(path.to_str().unwrap());

    {
        let ledger = TrafficLedger::connect(&config).await.unwrap();
        ledger.apply_snapshot(1, 10, "user-10@lunet", 64, 128).await.unwrap();
        ledger.pool().close().await;
    }
    assert!(path.exists());

    let ledger = TrafficLedger::connect(&config).await.unwrap();
    assert_eq!(ledger.get_totals(1, 10).await.unwrap(), Totals::new(64, 128));
    let totals = ledger.apply_snapshot(1, 10, "user-10@lunet", 10, 128).await.unwrap();
    assert_eq!(totals, Totals::new(74, 128));
}
