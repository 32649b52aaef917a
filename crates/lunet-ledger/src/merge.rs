use serde::Serialize;

/// Cumulative totals for one row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub uplink: i64,
    pub downlink: i64,
    pub total: i64,
}

impl Totals {
    pub fn new(uplink: i64, downlink: i64) -> Self {
        let uplink = uplink.max(0);
        let downlink = downlink.max(0);
        Self {
            uplink,
            downlink,
            total: uplink.saturating_add(downlink),
        }
    }
}

/// Fold one raw reading into a cumulative total.
///
/// Returns the new total and whether the reading was an upstream reset
/// (lower than `last`). On a reset the whole reading is new traffic.
pub fn fold_counter(last: i64, total: i64, current: i64) -> (i64, bool) {
    let last = last.max(0);
    let total = total.max(0);
    let current = current.max(0);
    if current >= last {
        (total.saturating_add(current - last), false)
    } else {
        (total.saturating_add(current), true)
    }
}
