//! Status payload as reported by the server, and its normalized view.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Raw status payload, exactly as it comes off the wire.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub started: Option<String>,
    pub uptime: Option<String>,
    #[serde(default)]
    pub is_running: bool,
    pub version: Option<String>,
    pub environment: Option<String>,
    pub port: Option<u16>,
    pub open_protocol: Option<u16>,
    #[serde(rename = "OPCUA")]
    pub opcua: Option<Vec<Address>>,
    pub controllers: Option<OrderedMap>,
    pub clients: Option<OrderedMap>,
}

/// Listener address; older servers report bare port numbers.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Address {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Text(s) => f.write_str(s),
            Address::Number(n) => write!(f, "{}", n),
        }
    }
}

/// String-keyed map with JavaScript object key semantics: a repeated key
/// keeps its first position and takes the last value, and array-index keys
/// come first in ascending numeric order, then the rest in document order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderedMap(pub Vec<(String, String)>);

impl<'de> Deserialize<'de> for OrderedMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedMapVisitor;

        impl<'de> Visitor<'de> for OrderedMapVisitor {
            type Value = OrderedMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of identifiers to descriptions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<OrderedMap, A::Error> {
                let mut entries: Vec<(String, String)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    match entries.iter_mut().find(|(k, _)| *k == key) {
                        Some(existing) => existing.1 = value,
                        None => entries.push((key, value)),
                    }
                }
                // Stable, so non-index keys keep document order
                entries.sort_by_key(|(key, _)| array_index(key).map_or((1, 0), |i| (0, i)));
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor)
    }
}

/// Canonical array index: decimal digits, no leading zero, below 2^32 - 1.
fn array_index(key: &str) -> Option<u32> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if key.len() > 1 && key.starts_with('0') {
        return None;
    }
    key.parse::<u32>().ok().filter(|&i| i != u32::MAX)
}

/// Resolve a wall-clock time the way a browser does: an ambiguous time takes
/// the earlier instant, a time inside a spring-forward gap moves forward.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    tz.from_local_datetime(naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(*naive + Duration::hours(1))).earliest())
        .map(|at| at.fixed_offset())
}

/// When the server was started.
///
/// A start time the server reports but that cannot be parsed is kept as
/// `Invalid` so it still shows up (as "Invalid Date") instead of silently
/// turning into "unknown".
#[derive(Clone, Debug, PartialEq)]
pub enum StartTime {
    At(DateTime<FixedOffset>),
    Invalid(String),
}

impl StartTime {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
            return StartTime::At(at);
        }
        // No offset given: local time, the way a browser reads it
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
                if let Some(at) = resolve_local(&Local, &naive) {
                    return StartTime::At(at);
                }
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return StartTime::At(Utc.from_utc_datetime(&midnight).fixed_offset());
            }
        }
        StartTime::Invalid(raw.to_string())
    }

    /// Display form used by the panel, e.g. `2024-3-7 9:05 PM`.
    pub fn display(&self) -> String {
        match self {
            StartTime::At(at) => at.with_timezone(&Local).format("%Y-%-m-%-d %-I:%M %p").to_string(),
            StartTime::Invalid(_) => "Invalid Date".to_string(),
        }
    }
}

impl Serialize for StartTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StartTime::At(at) => serializer.serialize_str(&at.to_rfc3339()),
            StartTime::Invalid(raw) => serializer.serialize_str(raw),
        }
    }
}

/// Normalized server status.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub started_at: Option<StartTime>,
    pub uptime: Option<String>,
    pub version: Option<String>,
    pub environment: Option<String>,
    pub is_running: bool,
    pub web_port: Option<u16>,
    pub protocol_port: Option<u16>,
    pub secondary_addresses: Option<Vec<String>>,
}

/// One connected client or controller.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ConnectionEntry {
    pub key: String,
    pub description: String,
}

/// Everything the panel shows for one successful poll.
///
/// `None` for a list means the server did not report it at all, which the
/// panel treats differently from an empty list.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct StatusView {
    pub snapshot: StatusSnapshot,
    pub clients: Option<Vec<ConnectionEntry>>,
    pub controllers: Option<Vec<ConnectionEntry>>,
}

impl StatusView {
    pub fn client_count(&self) -> usize {
        self.clients.as_ref().map_or(0, Vec::len)
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.as_ref().map_or(0, Vec::len)
    }
}

fn connection_entries(map: Option<OrderedMap>) -> Option<Vec<ConnectionEntry>> {
    map.map(|OrderedMap(entries)| {
        entries
            .into_iter()
            .map(|(key, description)| ConnectionEntry { key, description })
            .collect()
    })
}

/// Turn a raw payload into the view the panel renders.
pub fn transform(payload: StatusPayload) -> StatusView {
    let snapshot = StatusSnapshot {
        started_at: payload.started.as_deref().map(StartTime::parse),
        uptime: payload.uptime,
        version: payload.version,
        environment: payload.environment,
        is_running: payload.is_running,
        web_port: payload.port,
        protocol_port: payload.open_protocol,
        secondary_addresses: payload
            .opcua
            .map(|addrs| addrs.iter().map(ToString::to_string).collect()),
    };

    StatusView {
        snapshot,
        clients: connection_entries(payload.clients),
        controllers: connection_entries(payload.controllers),
    }
}
