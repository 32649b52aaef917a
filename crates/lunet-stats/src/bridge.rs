use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lunet_xray::{ControlPlane, XrayError};
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::decode::{decode_single, decode_snapshot};
use crate::names::{self, Direction};
use crate::online::OnlineTracker;
use crate::probe::{StatProbe, is_missing};
use crate::types::{OnlineStatus, ResetSummary, StatReading, TrafficReading};

struct Snapshot {
    taken: Instant,
    values: HashMap<String, i64>,
}

/// Normalized view over the proxy's stats surface.
///
/// Aggregate queries never fail: a counter that cannot be read makes its
/// identity (or the inbound) `available: false` with zero values.
pub struct StatBridge {
    control: ControlPlane,
    tracker: OnlineTracker,
    ttl: Duration,
    snapshot: Mutex<Option<Snapshot>>,
}

impl StatBridge {
    pub fn new(control: ControlPlane, tracker: OnlineTracker) -> Self {
        let ttl = control.config().snapshot_ttl();
        Self {
            control,
            tracker,
            ttl,
            snapshot: Mutex::new(None),
        }
    }

    pub fn control(&self) -> &ControlPlane {
        &self.control
    }

    pub fn tracker(&self) -> &OnlineTracker {
        &self.tracker
    }

    fn cached(&self, name: &str) -> Option<StatReading> {
        let guard = self.snapshot.lock();
        let snap = guard.as_ref()?;
        if snap.taken.elapsed() > self.ttl {
            return None;
        }
        lunet_metrics::record_snapshot_hit();
        Some(match snap.values.get(name) {
            Some(&value) => StatReading::present(name, value),
            None => StatReading::missing(name),
        })
    }

    fn has_fresh_snapshot(&self) -> bool {
        self.snapshot
            .lock()
            .as_ref()
            .is_some_and(|s| s.taken.elapsed() <= self.ttl)
    }

    /// Drop the cached bulk snapshot.
    pub fn invalidate(&self) {
        self.snapshot.lock().take();
    }

    /// Take a bulk snapshot unless a fresh one is cached.
    ///
    /// Returns whether a fresh snapshot is available afterwards.
    pub async fn prefetch(&self) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        if self.has_fresh_snapshot() {
            return true;
        }
        match self.query_all(false).await {
            Ok(values) => {
                debug!(counters = values.len(), "stats snapshot taken");
                *self.snapshot.lock() = Some(Snapshot {
                    taken: Instant::now(),
                    values,
                });
                true
            }
            Err(e) => {
                debug!(error = %e, "stats snapshot unavailable, using point reads");
                false
            }
        }
    }

    async fn query_all(&self, reset: bool) -> Result<HashMap<String, i64>, XrayError> {
        let mut last = None;
        for probe in StatProbe::SNAPSHOT_CHAIN {
            let raw = match probe.query_stats_method() {
                Some(method) => {
                    let payload = json!({ "pattern": "", "reset": reset });
                    self.control.invoke(&method, &payload).await
                }
                None => {
                    let mut args = vec!["-pattern", ""];
                    if reset {
                        args.push("-reset");
                    }
                    self.control.xray_api("statsquery", args).await
                }
            };
            match raw.and_then(|raw| decode_snapshot(&raw)) {
                Ok(values) => return Ok(values),
                Err(e) => {
                    lunet_metrics::record_probe_fallback(probe.name());
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| XrayError::TransportUnavailable("no snapshot source".into())))
    }

    async fn probe_once(&self, probe: StatProbe, name: &str, reset: bool) -> Result<StatReading, XrayError> {
        match probe {
            StatProbe::GrpcXray | StatProbe::GrpcV2ray => {
                let method = probe.get_stats_method().unwrap_or_default();
                let payload = json!({ "name": name, "reset": reset });
                let raw = self.control.invoke(&method, &payload).await?;
                Ok(StatReading::present(name, decode_single(&raw)?))
            }
            StatProbe::CliStats => {
                let mut args = vec!["-name", name];
                if reset {
                    args.push("-reset");
                }
                let raw = self.control.xray_api("stats", args).await?;
                Ok(StatReading::present(name, decode_single(&raw)?))
            }
            StatProbe::CliQuery => {
                let mut args = vec!["-pattern", name];
                if reset {
                    args.push("-reset");
                }
                let raw = self.control.xray_api("statsquery", args).await?;
                Ok(match decode_snapshot(&raw)?.get(name) {
                    Some(&value) => StatReading::present(name, value),
                    None => StatReading::missing(name),
                })
            }
        }
    }

    /// Read one counter.
    ///
    /// A fresh bulk snapshot answers non-reset reads. Otherwise probes run
    /// in [`StatProbe::CHAIN`] order. A reset read always goes upstream
    /// and invalidates the snapshot.
    pub async fn read_stat(&self, name: &str, reset: bool) -> Result<StatReading, XrayError> {
        if reset {
            self.invalidate();
        } else if let Some(reading) = self.cached(name) {
            return Ok(reading);
        }

        let mut last = None;
        for probe in StatProbe::CHAIN {
            match self.probe_once(probe, name, reset).await {
                Ok(reading) => {
                    if reading.missing {
                        lunet_metrics::record_stat_missing();
                    }
                    return Ok(reading);
                }
                Err(e) if is_missing(&e) => {
                    lunet_metrics::record_stat_missing();
                    return Ok(StatReading::missing(name));
                }
                Err(e) if probe.advances_on(&e) => {
                    debug!(stat = name, probe = probe.name(), error = %e, "stat probe failed, trying next");
                    lunet_metrics::record_probe_fallback(probe.name());
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| XrayError::TransportUnavailable(format!("no probe read {name}"))))
    }

    async fn read_pair(&self, names: [String; 2]) -> Result<(i64, i64), XrayError> {
        let [up, down] = names;
        let up = self.read_stat(&up, false).await?;
        let down = self.read_stat(&down, false).await?;
        Ok((up.value, down.value))
    }

    /// Reset both directions independently. A counter that was zeroed is
    /// always counted, even when its partner failed.
    async fn reset_pair(
        &self,
        names: [String; 2],
        summary: &mut ResetSummary,
    ) -> Result<(), XrayError> {
        let [up_name, down_name] = names;
        let up = self.read_stat(&up_name, true).await;
        let down = self.read_stat(&down_name, true).await;
        match (up, down) {
            (Err(e), Err(_)) => Err(e),
            (up, down) => {
                let failures = [(&up_name, up.as_ref().err()), (&down_name, down.as_ref().err())];
                for (name, failed) in failures {
                    if let Some(e) = failed {
                        warn!(stat = %name, error = %e, "counter reset failed");
                    }
                }
                summary.add(
                    up.map(|r| r.value).unwrap_or(0),
                    down.map(|r| r.value).unwrap_or(0),
                );
                Ok(())
            }
        }
    }

    fn inbound_names(&self) -> [String; 2] {
        let tag = &self.control.config().inbound_tag;
        Direction::BOTH.map(|d| names::inbound_traffic(tag, d))
    }

    /// Traffic through the configured inbound.
    ///
    /// Unavailable only when neither direction could be read.
    pub async fn get_inbound_traffic(&self) -> TrafficReading {
        self.prefetch().await;
        let [up_name, down_name] = self.inbound_names();
        let up = self.read_stat(&up_name, false).await;
        let down = self.read_stat(&down_name, false).await;
        match (up, down) {
            (Err(e), Err(_)) => {
                warn!(error = %e, "inbound traffic unavailable");
                TrafficReading::unavailable()
            }
            (up, down) => TrafficReading::new(
                up.map(|r| r.value).unwrap_or(0),
                down.map(|r| r.value).unwrap_or(0),
            ),
        }
    }

    async fn user_traffic(&self, identity: &str) -> TrafficReading {
        match self
            .read_pair(Direction::BOTH.map(|d| names::user_traffic(identity, d)))
            .await
        {
            Ok((up, down)) => TrafficReading::new(up, down),
            Err(e) => {
                debug!(identity, error = %e, "user traffic unavailable");
                TrafficReading::unavailable()
            }
        }
    }

    /// Traffic for each identity. One identity's failure never affects
    /// the others.
    pub async fn get_users_traffic(&self, identities: &[String]) -> HashMap<String, TrafficReading> {
        self.prefetch().await;
        let mut out = HashMap::with_capacity(identities.len());
        for identity in identities {
            let reading = self.user_traffic(identity).await;
            out.insert(identity.clone(), reading);
        }
        out
    }

    /// Online state for each identity, at the current wall-clock time.
    pub async fn get_users_online(
        &self,
        identities: &[String],
        traffic_hint: Option<&HashMap<String, TrafficReading>>,
    ) -> HashMap<String, OnlineStatus> {
        self.get_users_online_at(identities, traffic_hint, unix_now()).await
    }

    /// Online state for each identity at `now` (unix seconds).
    ///
    /// Native counters win when either spelling exists upstream. Otherwise
    /// the state is inferred from traffic growth, using `traffic_hint`
    /// when it has a reading for the identity.
    pub async fn get_users_online_at(
        &self,
        identities: &[String],
        traffic_hint: Option<&HashMap<String, TrafficReading>>,
        now: u64,
    ) -> HashMap<String, OnlineStatus> {
        self.prefetch().await;
        let mut out = HashMap::with_capacity(identities.len());
        for identity in identities {
            let status = match self.native_online(identity).await {
                Some(value) => OnlineStatus {
                    supported: true,
                    inferred: false,
                    online: value > 0,
                    value,
                },
                None => {
                    let traffic = match traffic_hint.and_then(|h| h.get(identity)) {
                        Some(t) => *t,
                        None => self.user_traffic(identity).await,
                    };
                    self.infer(identity, &traffic, now)
                }
            };
            out.insert(identity.clone(), status);
        }
        let online = out.values().filter(|s| s.online).count();
        lunet_metrics::set_online_users(online);
        out
    }

    async fn native_online(&self, identity: &str) -> Option<i64> {
        for name in names::user_online(identity) {
            match self.read_stat(&name, false).await {
                Ok(reading) if !reading.missing => return Some(reading.value),
                Ok(_) => {}
                Err(e) => debug!(stat = %name, error = %e, "online counter unreadable"),
            }
        }
        None
    }

    fn infer(&self, identity: &str, traffic: &TrafficReading, now: u64) -> OnlineStatus {
        if traffic.available {
            return OnlineStatus {
                supported: false,
                inferred: true,
                online: self.tracker.observe(identity, traffic.total, now),
                value: 0,
            };
        }
        match self.tracker.last_known(identity, now) {
            Some(online) => OnlineStatus {
                supported: false,
                inferred: true,
                online,
                value: 0,
            },
            None => OnlineStatus::default(),
        }
    }

    /// Zero the inbound counters, returning their pre-reset values.
    pub async fn reset_inbound_traffic(&self) -> ResetSummary {
        let mut summary = ResetSummary::default();
        if let Err(e) = self.reset_pair(self.inbound_names(), &mut summary).await {
            warn!(error = %e, "inbound traffic reset failed");
        }
        summary
    }

    /// Zero each identity's counters, summing pre-reset values.
    ///
    /// `available` is set when at least one identity was reset.
    pub async fn reset_users_traffic(&self, identities: &[String]) -> ResetSummary {
        let mut summary = ResetSummary::default();
        for identity in identities {
            let names = Direction::BOTH.map(|d| names::user_traffic(identity, d));
            if let Err(e) = self.reset_pair(names, &mut summary).await {
                warn!(identity = %identity, error = %e, "user traffic reset failed");
            }
        }
        summary
    }
}

impl std::fmt::Debug for StatBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatBridge")
            .field("control", &self.control)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests;
