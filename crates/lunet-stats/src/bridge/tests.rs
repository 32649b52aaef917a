//! Bridge tests against a scripted stats service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lunet_xray::scripted::{ScriptedRunner, rejected};
use lunet_xray::{CommandSpec, ControlPlane, XrayConfig, XrayError};
use parking_lot::Mutex;
use serde_json::Value;

use super::StatBridge;
use crate::online::{OnlineTracker, TrackerConfig};
use crate::types::TrafficReading;

const NOT_FOUND: &str =
    "rpc error: code = Unknown desc = app/stats/command: failed to get stat > stat not found";

/// In-process stand-in for the xray stats service and CLI.
struct FakeXray {
    counters: Mutex<HashMap<String, i64>>,
    grpc_xray: bool,
    grpc_v2ray: bool,
    grpc_query: bool,
    cli: bool,
    down: bool,
    broken: Vec<String>,
}

impl Default for FakeXray {
    fn default() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            grpc_xray: true,
            grpc_v2ray: true,
            grpc_query: true,
            cli: true,
            down: false,
            broken: Vec::new(),
        }
    }
}

impl FakeXray {
    fn with(self, name: &str, value: i64) -> Self {
        self.counters.lock().insert(name.to_string(), value);
        self
    }

    fn value(&self, name: &str) -> Option<i64> {
        self.counters.lock().get(name).copied()
    }

    fn read(&self, name: &str, reset: bool) -> Option<i64> {
        let mut counters = self.counters.lock();
        let value = counters.get_mut(name)?;
        let before = *value;
        if reset {
            *value = 0;
        }
        Some(before)
    }

    fn query(&self, pattern: &str, reset: bool, quote: bool) -> String {
        let mut counters = self.counters.lock();
        let mut stats = Vec::new();
        for (name, value) in counters.iter_mut().filter(|(n, _)| n.contains(pattern)) {
            let v = if quote {
                Value::String(value.to_string())
            } else {
                Value::from(*value)
            };
            stats.push(serde_json::json!({ "name": name, "value": v }));
            if reset {
                *value = 0;
            }
        }
        serde_json::json!({ "stat": stats }).to_string()
    }

    fn answer(&self, spec: &CommandSpec) -> Option<Result<Vec<u8>, XrayError>> {
        if self.down {
            return Some(Err(XrayError::TransportUnavailable("connection refused".into())));
        }
        match spec.program_name() {
            "grpcurl" => Some(self.grpc(spec)),
            "xray" => Some(self.cli(spec)),
            _ => None,
        }
    }

    fn grpc(&self, spec: &CommandSpec) -> Result<Vec<u8>, XrayError> {
        let method = spec.args.last().cloned().unwrap_or_default();
        let (service, call) = method.split_once('/').unwrap_or_default();
        let supported = if service.starts_with("xray.") {
            self.grpc_xray
        } else {
            self.grpc_v2ray
        };
        if !supported {
            return rejected(
                "grpcurl",
                &format!("Error invoking method: server does not expose service \"{service}\""),
            );
        }
        let body: Value = serde_json::from_str(spec.arg_after("-d").unwrap_or("{}")).unwrap();
        let reset = body["reset"].as_bool().unwrap_or(false);
        match call {
            "GetStats" => {
                let name = body["name"].as_str().unwrap_or_default();
                if self.broken.iter().any(|b| b == name) {
                    return rejected("grpcurl", "rpc error: code = Internal desc = boom");
                }
                match self.read(name, reset) {
                    // grpcurl omits zero int64 fields
                    Some(0) => Ok(format!("{{\"stat\":{{\"name\":\"{name}\"}}}}").into_bytes()),
                    Some(v) => Ok(format!(
                        "{{\"stat\":{{\"name\":\"{name}\",\"value\":\"{v}\"}}}}"
                    )
                    .into_bytes()),
                    None => rejected("grpcurl", NOT_FOUND),
                }
            }
            "QueryStats" if self.grpc_query => {
                let pattern = body["pattern"].as_str().unwrap_or_default();
                Ok(self.query(pattern, reset, true).into_bytes())
            }
            _ => rejected(
                "grpcurl",
                "rpc error: code = Unimplemented desc = unknown method",
            ),
        }
    }

    fn cli(&self, spec: &CommandSpec) -> Result<Vec<u8>, XrayError> {
        if !self.cli {
            return rejected("xray", "unknown command");
        }
        let reset = spec.has_arg("-reset");
        match spec.args.get(1).map(String::as_str) {
            Some("stats") => {
                let name = spec.arg_after("-name").unwrap_or_default();
                match self.read(name, reset) {
                    Some(v) => Ok(format!("{{\"stat\":{{\"name\":\"{name}\",\"value\":{v}}}}}")
                        .into_bytes()),
                    None => rejected("xray", NOT_FOUND),
                }
            }
            Some("statsquery") => {
                let pattern = spec.arg_after("-pattern").unwrap_or_default();
                Ok(self.query(pattern, reset, false).into_bytes())
            }
            _ => rejected("xray", "unknown command"),
        }
    }
}

fn setup(fake: FakeXray) -> (StatBridge, Arc<ScriptedRunner>, Arc<FakeXray>) {
    let fake = Arc::new(fake);
    let answering = fake.clone();
    let runner = Arc::new(ScriptedRunner::new().on(move |spec| answering.answer(spec)));
    let config = XrayConfig {
        inbound_tag: "vless-in".into(),
        ..Default::default()
    };
    let control = ControlPlane::new(config, runner.clone());
    let tracker = OnlineTracker::new(TrackerConfig {
        activity_window_secs: 60,
        ..Default::default()
    });
    (StatBridge::new(control, tracker), runner, fake)
}

fn method_calls(runner: &ScriptedRunner, suffix: &str) -> usize {
    runner
        .calls_to("grpcurl")
        .iter()
        .filter(|c| c.args.last().is_some_and(|m| m.ends_with(suffix)))
        .count()
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

const UP_1: &str = "user>>>user-1@lunet>>>traffic>>>uplink";
const DOWN_1: &str = "user>>>user-1@lunet>>>traffic>>>downlink";
const UP_2: &str = "user>>>user-2@lunet>>>traffic>>>uplink";
const DOWN_2: &str = "user>>>user-2@lunet>>>traffic>>>downlink";

#[tokio::test]
async fn snapshot_answers_point_reads() {
    let (bridge, runner, _) = setup(FakeXray::default().with(UP_1, 100).with(DOWN_1, 900));

    let traffic = bridge
        .get_users_traffic(&ids(&["user-1@lunet", "user-2@lunet"]))
        .await;

    assert_eq!(traffic["user-1@lunet"], TrafficReading::new(100, 900));
    // absent from a fresh snapshot: never created upstream
    assert_eq!(traffic["user-2@lunet"], TrafficReading::new(0, 0));
    assert_eq!(method_calls(&runner, "/QueryStats"), 1);
    assert_eq!(method_calls(&runner, "/GetStats"), 0);
}

#[tokio::test(start_paused = true)]
async fn snapshot_expires_after_ttl() {
    let (bridge, runner, fake) = setup(FakeXray::default().with(UP_1, 1));

    bridge.get_users_traffic(&ids(&["user-1@lunet"])).await;
    fake.counters.lock().insert(UP_1.into(), 5);
    let cached = bridge.get_users_traffic(&ids(&["user-1@lunet"])).await;
    assert_eq!(cached["user-1@lunet"].uplink, 1);

    tokio::time::advance(Duration::from_millis(1500)).await;
    let fresh = bridge.get_users_traffic(&ids(&["user-1@lunet"])).await;
    assert_eq!(fresh["user-1@lunet"].uplink, 5);
    assert_eq!(method_calls(&runner, "/QueryStats"), 2);
}

#[tokio::test]
async fn point_reads_when_no_snapshot_source() {
    let fake = FakeXray {
        grpc_query: false,
        cli: false,
        ..Default::default()
    }
    .with(UP_1, 7)
    .with(DOWN_1, 0);
    let (bridge, runner, _) = setup(fake);

    let traffic = bridge.get_users_traffic(&ids(&["user-1@lunet"])).await;
    assert_eq!(traffic["user-1@lunet"], TrafficReading::new(7, 0));
    assert_eq!(method_calls(&runner, "/GetStats"), 2);
}

#[tokio::test]
async fn legacy_namespace_then_cli() {
    let fake = FakeXray {
        grpc_xray: false,
        grpc_query: false,
        ..Default::default()
    }
    .with(UP_1, 3);
    let (bridge, _, _) = setup(fake);
    let reading = bridge.read_stat(UP_1, false).await.unwrap();
    assert_eq!(reading.value, 3);

    let fake = FakeXray {
        grpc_xray: false,
        grpc_v2ray: false,
        ..Default::default()
    }
    .with(UP_1, 4);
    let (bridge, runner, _) = setup(fake);
    let reading = bridge.read_stat(UP_1, false).await.unwrap();
    assert_eq!(reading.value, 4);
    let cli = runner.calls_to("xray");
    assert_eq!(cli[0].args[1], "stats");
}

#[tokio::test]
async fn missing_counter_reads_as_zero() {
    let (bridge, _, _) = setup(FakeXray {
        grpc_query: false,
        cli: false,
        ..Default::default()
    });
    let reading = bridge.read_stat(UP_1, false).await.unwrap();
    assert!(reading.missing);
    assert_eq!(reading.value, 0);

    let traffic = bridge.get_users_traffic(&ids(&["user-1@lunet"])).await;
    assert!(traffic["user-1@lunet"].available);
}

#[tokio::test]
async fn outage_degrades_to_unavailable() {
    let (bridge, _, _) = setup(FakeXray {
        down: true,
        ..Default::default()
    });
    assert_eq!(bridge.get_inbound_traffic().await, TrafficReading::unavailable());
    let traffic = bridge.get_users_traffic(&ids(&["user-1@lunet"])).await;
    assert!(!traffic["user-1@lunet"].available);
    assert!(bridge.read_stat(UP_1, false).await.is_err());
}

#[tokio::test]
async fn one_identity_failure_is_isolated() {
    let fake = FakeXray {
        grpc_query: false,
        cli: false,
        broken: vec![UP_2.to_string()],
        ..Default::default()
    }
    .with(UP_1, 10)
    .with(DOWN_1, 20)
    .with(UP_2, 1)
    .with(DOWN_2, 1);
    let (bridge, _, _) = setup(fake);

    let traffic = bridge
        .get_users_traffic(&ids(&["user-1@lunet", "user-2@lunet"]))
        .await;
    assert_eq!(traffic["user-1@lunet"], TrafficReading::new(10, 20));
    assert_eq!(traffic["user-2@lunet"], TrafficReading::unavailable());
}

#[tokio::test]
async fn inbound_traffic_tolerates_one_direction() {
    let fake = FakeXray {
        grpc_query: false,
        cli: false,
        broken: vec!["inbound>>>vless-in>>>traffic>>>downlink".into()],
        ..Default::default()
    }
    .with("inbound>>>vless-in>>>traffic>>>uplink", 50);
    let (bridge, _, _) = setup(fake);
    let inbound = bridge.get_inbound_traffic().await;
    assert!(inbound.available);
    assert_eq!(inbound.uplink, 50);
    assert_eq!(inbound.total, 50);
}

#[tokio::test]
async fn native_online_counter_is_supported() {
    let fake = FakeXray::default()
        .with("user>>>user-1@lunet>>>online>>>count", 2)
        .with(UP_1, 10);
    let (bridge, _, _) = setup(fake);

    let online = bridge
        .get_users_online_at(&ids(&["user-1@lunet"]), None, 1_000)
        .await;
    let status = online["user-1@lunet"];
    assert!(status.supported);
    assert!(!status.inferred);
    assert!(status.online);
    assert_eq!(status.value, 2);
}

#[tokio::test]
async fn online_inferred_from_traffic_growth() {
    let (bridge, _, _) = setup(FakeXray::default());
    let who = ids(&["user-1@lunet"]);
    let at = |total: i64| {
        HashMap::from([("user-1@lunet".to_string(), TrafficReading::new(total, 0))])
    };

    let first = bridge.get_users_online_at(&who, Some(&at(100)), 0).await;
    assert!(first["user-1@lunet"].inferred);
    assert!(first["user-1@lunet"].online);

    bridge.get_users_online_at(&who, Some(&at(150)), 30).await;
    let still = bridge.get_users_online_at(&who, Some(&at(150)), 89).await;
    assert!(still["user-1@lunet"].online);
    let gone = bridge.get_users_online_at(&who, Some(&at(150)), 91).await;
    assert!(!gone["user-1@lunet"].online);
    assert!(!gone["user-1@lunet"].supported);
}

#[tokio::test]
async fn reset_users_aggregates_partial_success() {
    let fake = FakeXray {
        broken: vec![UP_2.to_string()],
        ..Default::default()
    }
    .with(UP_1, 10)
    .with(DOWN_1, 5)
    .with(UP_2, 99)
    .with(DOWN_2, 99);
    let (bridge, _, fake) = setup(fake);

    // warm the snapshot so reset must bypass it
    bridge.prefetch().await;
    let summary = bridge
        .reset_users_traffic(&ids(&["user-1@lunet", "user-2@lunet"]))
        .await;
    assert!(summary.available);
    assert_eq!(summary.reset_uplink, 10);
    // user-2's downlink was still zeroed and counts
    assert_eq!(summary.reset_downlink, 104);
    assert_eq!(summary.reset_total, 114);
    assert_eq!(fake.value(UP_1), Some(0));
    assert_eq!(fake.value(UP_2), Some(99));
    assert_eq!(fake.value(DOWN_2), Some(0));

    let after = bridge.get_users_traffic(&ids(&["user-1@lunet"])).await;
    assert_eq!(after["user-1@lunet"], TrafficReading::new(0, 0));
}

#[tokio::test]
async fn inbound_reset_keeps_the_direction_that_succeeded() {
    let fake = FakeXray {
        broken: vec!["inbound>>>vless-in>>>traffic>>>downlink".into()],
        ..Default::default()
    }
    .with("inbound>>>vless-in>>>traffic>>>uplink", 70)
    .with("inbound>>>vless-in>>>traffic>>>downlink", 30);
    let (bridge, _, fake) = setup(fake);

    let summary = bridge.reset_inbound_traffic().await;
    assert!(summary.available);
    assert_eq!(summary.reset_uplink, 70);
    assert_eq!(summary.reset_downlink, 0);
    assert_eq!(summary.reset_total, 70);
    assert_eq!(fake.value("inbound>>>vless-in>>>traffic>>>uplink"), Some(0));
    assert_eq!(fake.value("inbound>>>vless-in>>>traffic>>>downlink"), Some(30));
}

#[tokio::test]
async fn user_reset_with_failed_uplink_still_counts_downlink() {
    let fake = FakeXray {
        broken: vec![UP_1.to_string()],
        ..Default::default()
    }
    .with(UP_1, 8)
    .with(DOWN_1, 12);
    let (bridge, _, fake) = setup(fake);

    let summary = bridge.reset_users_traffic(&ids(&["user-1@lunet"])).await;
    assert!(summary.available);
    assert_eq!(summary.reset_uplink, 0);
    assert_eq!(summary.reset_downlink, 12);
    assert_eq!(fake.value(UP_1), Some(8));
    assert_eq!(fake.value(DOWN_1), Some(0));
}

#[tokio::test]
async fn reset_with_nothing_reachable_is_unavailable() {
    let (bridge, _, _) = setup(FakeXray {
        down: true,
        ..Default::default()
    });
    assert!(!bridge.reset_inbound_traffic().await.available);
    assert!(!bridge.reset_users_traffic(&ids(&["user-1@lunet"])).await.available);
}
