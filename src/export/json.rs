//! Versioned session file format.
//!
//! Version 2.0.0 stores every hop with its raw `{s, e}` timestamp pairs.
//! Version 1.0.0 stored hop identities plus one flat ping list for the whole
//! session; it is read but never written.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::net::IpAddr;
use thiserror::Error;

use crate::config::SessionConfig;
use crate::state::{HopRecord, Millis, PingEvent};

/// Version written by `serialize`
pub const FORMAT_VERSION: &str = "2.0.0";
const LEGACY_VERSION: &str = "1.0.0";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported session file version: {0}")]
    UnsupportedVersion(String),
    #[error("malformed session file: {0}")]
    Malformed(String),
}

/// A session read back from disk
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub config: SessionConfig,
    /// Hops in ascending hop-number order, histories replayed
    pub hops: Vec<HopRecord>,
    /// None if the file's export date is not a valid timestamp
    pub exported_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotV2 {
    version: String,
    config: SessionConfig,
    hops: Vec<StoredHop>,
    export_date: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredHop {
    hop_number: u8,
    ip: IpAddr,
    hostname: Option<String>,
    #[serde(default)]
    ping_history: Vec<CompactPing>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CompactPing {
    s: Millis,
    e: Option<Millis>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotV1 {
    config: SessionConfig,
    hops: Vec<LegacyHop>,
    #[serde(default)]
    ping_history: Vec<LegacyPing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyHop {
    hop_number: u8,
    ip: IpAddr,
    #[serde(default)]
    hostname: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyPing {
    sent_timestamp: Millis,
    target_ip: String,
    #[serde(default)]
    response_timestamp: Option<Millis>,
    #[serde(default = "default_true")]
    is_successful: bool,
}

fn default_true() -> bool {
    true
}

/// Encode a session as compact JSON in the current format
pub fn serialize(config: &SessionConfig, hops: &[HopRecord]) -> Result<Vec<u8>, CodecError> {
    let snapshot = SnapshotV2 {
        version: FORMAT_VERSION.to_string(),
        config: config.clone(),
        hops: hops
            .iter()
            .map(|hop| StoredHop {
                hop_number: hop.hop_number(),
                ip: hop.ip(),
                hostname: hop.hostname().map(str::to_string),
                ping_history: hop
                    .history()
                    .iter()
                    .map(|p| CompactPing {
                        s: p.sent_at(),
                        e: p.responded_at(),
                    })
                    .collect(),
            })
            .collect(),
        export_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    serde_json::to_vec(&snapshot).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Decode a session file of either known version.
///
/// Either the whole file is valid and a full session comes back, or nothing
/// does. Histories are replayed through `HopRecord::record`, so the derived
/// counters match what a live session would have computed.
pub fn deserialize(bytes: &[u8]) -> Result<LoadedSession, CodecError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let version = check_structure(&value)?;

    match version.as_str() {
        FORMAT_VERSION => {
            let snapshot: SnapshotV2 =
                serde_json::from_value(value).map_err(|e| CodecError::Malformed(e.to_string()))?;
            load_v2(snapshot)
        }
        LEGACY_VERSION => {
            let exported_at = value["exportDate"].as_str().and_then(parse_date);
            let snapshot: SnapshotV1 =
                serde_json::from_value(value).map_err(|e| CodecError::Malformed(e.to_string()))?;
            load_v1(snapshot, exported_at)
        }
        other => Err(CodecError::UnsupportedVersion(other.to_string())),
    }
}

/// The fields every version has. Returns the version string.
fn check_structure(value: &Value) -> Result<String, CodecError> {
    let obj = value
        .as_object()
        .ok_or_else(|| CodecError::Malformed("not a JSON object".into()))?;

    let version = obj
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::Malformed("missing version".into()))?;
    if !obj.get("config").is_some_and(Value::is_object) {
        return Err(CodecError::Malformed("missing config".into()));
    }
    if !obj.get("hops").is_some_and(Value::is_array) {
        return Err(CodecError::Malformed("missing hops".into()));
    }
    if !obj.get("exportDate").is_some_and(Value::is_string) {
        return Err(CodecError::Malformed("missing exportDate".into()));
    }
    Ok(version.to_string())
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn check_hop_numbers(numbers: impl Iterator<Item = u8>) -> Result<(), CodecError> {
    let mut seen = HashSet::new();
    for n in numbers {
        if n == 0 {
            return Err(CodecError::Malformed("hop number 0".into()));
        }
        if !seen.insert(n) {
            return Err(CodecError::Malformed(format!("duplicate hop {}", n)));
        }
    }
    Ok(())
}

/// Send times are epoch milliseconds and a response never precedes its send
fn check_timestamps(hop_number: u8, sent: Millis, responded: Option<Millis>) -> Result<(), CodecError> {
    if sent < 0 {
        return Err(CodecError::Malformed(format!(
            "hop {}: negative send time {}",
            hop_number, sent
        )));
    }
    if let Some(e) = responded
        && e < sent
    {
        return Err(CodecError::Malformed(format!(
            "hop {}: response at {} before send at {}",
            hop_number, e, sent
        )));
    }
    Ok(())
}

fn restore(hop_number: u8, ip: IpAddr, hostname: Option<&str>) -> HopRecord {
    let mut hop = HopRecord::new(hop_number, ip);
    if let Some(name) = hostname {
        hop.set_hostname(name);
    }
    hop
}

fn load_v2(snapshot: SnapshotV2) -> Result<LoadedSession, CodecError> {
    check_hop_numbers(snapshot.hops.iter().map(|h| h.hop_number))?;

    let mut hops = Vec::with_capacity(snapshot.hops.len());
    for stored in snapshot.hops {
        let mut hop = restore(stored.hop_number, stored.ip, stored.hostname.as_deref());
        for ping in stored.ping_history {
            check_timestamps(stored.hop_number, ping.s, ping.e)?;
            hop.record(PingEvent::from_timestamps(ping.s, ping.e));
        }
        hops.push(hop);
    }
    hops.sort_by_key(HopRecord::hop_number);

    Ok(LoadedSession {
        config: snapshot.config,
        hops,
        exported_at: parse_date(&snapshot.export_date),
    })
}

/// Flat pings are attributed to the first hop with the same IP. Pings whose
/// IP matches no hop are dropped.
fn load_v1(
    snapshot: SnapshotV1,
    exported_at: Option<DateTime<Utc>>,
) -> Result<LoadedSession, CodecError> {
    check_hop_numbers(snapshot.hops.iter().map(|h| h.hop_number))?;

    let mut hops: Vec<HopRecord> = snapshot
        .hops
        .iter()
        .map(|h| restore(h.hop_number, h.ip, h.hostname.as_deref()))
        .collect();
    hops.sort_by_key(HopRecord::hop_number);

    let mut pings = snapshot.ping_history;
    pings.sort_by_key(|p| p.sent_timestamp);
    for ping in pings {
        if ping.sent_timestamp < 0 {
            return Err(CodecError::Malformed(format!(
                "ping to {}: negative send time {}",
                ping.target_ip, ping.sent_timestamp
            )));
        }
        let Ok(ip) = ping.target_ip.parse::<IpAddr>() else {
            continue;
        };
        let Some(hop) = hops.iter_mut().find(|h| h.ip() == ip) else {
            continue;
        };
        let responded_at = ping
            .response_timestamp
            .filter(|e| ping.is_successful && *e >= ping.sent_timestamp);
        hop.record(PingEvent::from_timestamps(ping.sent_timestamp, responded_at));
    }

    Ok(LoadedSession {
        config: snapshot.config,
        hops,
        exported_at,
    })
}
