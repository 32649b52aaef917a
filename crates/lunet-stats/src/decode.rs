//! Decoding of stats service output.
//!
//! grpcurl renders int64 fields as JSON strings and omits zero values,
//! while `xray api` prints plain numbers. Both shapes are accepted.

use std::collections::HashMap;

use lunet_xray::XrayError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Stat {
    #[serde(default)]
    name: String,
    #[serde(default, deserialize_with = "counter_value")]
    value: i64,
}

#[derive(Debug, Default, Deserialize)]
struct GetStatsResponse {
    #[serde(default)]
    stat: Option<Stat>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryStatsResponse {
    #[serde(default)]
    stat: Vec<Stat>,
}

fn counter_value<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|v| i64::try_from(v).unwrap_or(i64::MAX)))
            .ok_or_else(|| serde::de::Error::custom(format!("counter {n} is not an integer"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| serde::de::Error::custom(format!("counter {s:?}: {e}"))),
        other => Err(serde::de::Error::custom(format!(
            "unexpected counter value {other}"
        ))),
    }
}

fn parse<T>(raw: &str) -> Result<T, XrayError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(raw).map_err(|e| XrayError::Decode(e.to_string()))
}

/// Value of a single-stat response. An empty response reads as 0.
pub fn decode_single(raw: &str) -> Result<i64, XrayError> {
    let resp: GetStatsResponse = parse(raw)?;
    Ok(resp.stat.map(|s| s.value).unwrap_or(0).max(0))
}

/// All counters of a query response, keyed by name.
pub fn decode_snapshot(raw: &str) -> Result<HashMap<String, i64>, XrayError> {
    let resp: QueryStatsResponse = parse(raw)?;
    Ok(resp
        .stat
        .into_iter()
        .filter(|s| !s.name.is_empty())
        .map(|s| (s.name, s.value.max(0)))
        .collect())
}
