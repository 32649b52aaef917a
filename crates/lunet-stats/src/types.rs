use serde::Serialize;

/// One counter read.
///
/// `missing` means the counter was never created upstream, which is
/// zero activity rather than a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatReading {
    pub name: String,
    pub value: i64,
    pub missing: bool,
}

impl StatReading {
    pub fn present(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
            missing: false,
        }
    }

    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: 0,
            missing: true,
        }
    }
}

/// Uplink and downlink for one inbound or identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficReading {
    pub available: bool,
    pub uplink: i64,
    pub downlink: i64,
    pub total: i64,
}

impl TrafficReading {
    pub fn new(uplink: i64, downlink: i64) -> Self {
        Self {
            available: true,
            uplink,
            downlink,
            total: uplink.saturating_add(downlink),
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OnlineStatus {
    /// A native online counter exists upstream.
    pub supported: bool,
    /// The state comes from traffic-based inference.
    pub inferred: bool,
    pub online: bool,
    /// Native counter value, 0 when inferred.
    pub value: i64,
}

/// Pre-reset values of counters zeroed by a reset read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub available: bool,
    pub reset_uplink: i64,
    pub reset_downlink: i64,
    pub reset_total: i64,
}

impl ResetSummary {
    pub(crate) fn add(&mut self, uplink: i64, downlink: i64) {
        self.available = true;
        self.reset_uplink = self.reset_uplink.saturating_add(uplink);
        self.reset_downlink = self.reset_downlink.saturating_add(downlink);
        self.reset_total = self.reset_uplink.saturating_add(self.reset_downlink);
    }
}
