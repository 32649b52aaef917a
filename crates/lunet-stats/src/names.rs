//! Stat name keys.
//!
//! Names are case-sensitive `>>>`-delimited paths.

/// Traffic direction of a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Uplink,
    Downlink,
}

impl Direction {
    pub const BOTH: [Self; 2] = [Self::Uplink, Self::Downlink];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uplink => "uplink",
            Self::Downlink => "downlink",
        }
    }
}

pub fn inbound_traffic(tag: &str, direction: Direction) -> String {
    format!("inbound>>>{tag}>>>traffic>>>{}", direction.as_str())
}

pub fn user_traffic(identity: &str, direction: Direction) -> String {
    format!("user>>>{identity}>>>traffic>>>{}", direction.as_str())
}

/// Native online counter names, in probe order.
pub fn user_online(identity: &str) -> [String; 2] {
    [
        format!("user>>>{identity}>>>online"),
        format!("user>>>{identity}>>>online>>>count"),
    ]
}
