use serde::Serialize;
use std::net::IpAddr;

/// Epoch milliseconds
pub type Millis = i64;

/// Outcome of one probe of one hop.
///
/// A response time exists exactly when a response timestamp exists, and it
/// is always derived from the two timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingEvent {
    sent_at: Millis,
    responded_at: Option<Millis>,
    round_trip_ms: Option<f64>,
}

impl PingEvent {
    /// Build from raw timestamps (the persisted representation)
    pub fn from_timestamps(sent_at: Millis, responded_at: Option<Millis>) -> Self {
        Self {
            sent_at,
            responded_at,
            round_trip_ms: responded_at.map(|e| e.saturating_sub(sent_at) as f64),
        }
    }

    /// A successful probe. The RTT is kept at millisecond resolution so a
    /// replayed history yields the same statistics as the live one.
    pub fn success(sent_at: Millis, rtt_ms: f64) -> Self {
        let rtt = rtt_ms.round().max(0.0) as Millis;
        Self::from_timestamps(sent_at, Some(sent_at.saturating_add(rtt)))
    }

    /// A probe that timed out or failed
    pub fn timeout(sent_at: Millis) -> Self {
        Self::from_timestamps(sent_at, None)
    }

    pub fn sent_at(&self) -> Millis {
        self.sent_at
    }

    pub fn responded_at(&self) -> Option<Millis> {
        self.responded_at
    }

    pub fn round_trip_ms(&self) -> Option<f64> {
        self.round_trip_ms
    }

    pub fn is_success(&self) -> bool {
        self.responded_at.is_some()
    }
}

/// What a mutation changed, for the caller to turn into a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopChange {
    HostnameResolved,
    PingRecorded,
}

/// Point-in-time view of a hop, as sent to consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HopSnapshot {
    pub hop_number: u8,
    pub ip: IpAddr,
    pub hostname: Option<String>,
    pub is_reachable: bool,
    pub average_response_time: Option<f64>,
    pub successful_pings: u64,
    pub failed_pings: u64,
}

/// A router discovered at a given hop number, with its ping history.
///
/// Identity (hop number, IP) is fixed at creation. The history is append
/// only; counters and averages are always recomputed from it.
#[derive(Debug, Clone)]
pub struct HopRecord {
    hop_number: u8,
    ip: IpAddr,
    hostname: Option<String>,
    reachable: bool,
    history: Vec<PingEvent>,
    released: bool,
}

impl HopRecord {
    pub fn new(hop_number: u8, ip: IpAddr) -> Self {
        Self {
            hop_number,
            ip,
            hostname: None,
            reachable: false,
            history: Vec::new(),
            released: false,
        }
    }

    pub fn hop_number(&self) -> u8 {
        self.hop_number
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    pub fn history(&self) -> &[PingEvent] {
        &self.history
    }

    /// Set the resolved hostname. Only the first resolution sticks; a name
    /// that is just the IP again is not a hostname.
    pub fn set_hostname(&mut self, hostname: &str) -> Option<HopChange> {
        let hostname = hostname.trim().trim_end_matches('.');
        if self.released
            || self.hostname.is_some()
            || hostname.is_empty()
            || hostname == self.ip.to_string()
        {
            return None;
        }
        self.hostname = Some(hostname.to_string());
        Some(HopChange::HostnameResolved)
    }

    /// Append a probe outcome. This is the only way history grows, both for
    /// live probing and for replaying a saved session.
    pub fn record(&mut self, event: PingEvent) -> Option<HopChange> {
        if self.released {
            return None;
        }
        if event.is_success() {
            self.reachable = true;
        }
        self.history.push(event);
        Some(HopChange::PingRecorded)
    }

    pub fn success_count(&self) -> u64 {
        self.history.iter().filter(|e| e.is_success()).count() as u64
    }

    pub fn failure_count(&self) -> u64 {
        self.history.len() as u64 - self.success_count()
    }

    /// Mean RTT over successful probes
    pub fn mean_rtt(&self) -> Option<f64> {
        let (sum, n) = self
            .history
            .iter()
            .filter_map(PingEvent::round_trip_ms)
            .fold((0.0, 0u64), |(sum, n), rtt| (sum + rtt, n + 1));
        if n == 0 { None } else { Some(sum / n as f64) }
    }

    pub fn min_rtt(&self) -> Option<f64> {
        self.history
            .iter()
            .filter_map(PingEvent::round_trip_ms)
            .reduce(f64::min)
    }

    pub fn max_rtt(&self) -> Option<f64> {
        self.history
            .iter()
            .filter_map(PingEvent::round_trip_ms)
            .reduce(f64::max)
    }

    /// Loss percentage
    pub fn loss_pct(&self) -> f64 {
        if self.history.is_empty() {
            0.0
        } else {
            self.failure_count() as f64 / self.history.len() as f64 * 100.0
        }
    }

    pub fn snapshot(&self) -> HopSnapshot {
        HopSnapshot {
            hop_number: self.hop_number,
            ip: self.ip,
            hostname: self.hostname.clone(),
            is_reachable: self.reachable,
            average_response_time: self.mean_rtt(),
            successful_pings: self.success_count(),
            failed_pings: self.failure_count(),
        }
    }

    /// Drop the history and refuse further mutation
    pub fn release(&mut self) {
        self.history = Vec::new();
        self.released = true;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}
