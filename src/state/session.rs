use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;

use super::hop::{HopRecord, HopSnapshot};
use crate::config::SessionConfig;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Discovering,
    Probing,
    /// Terminal: stopped by the user or after the configured cycles
    Stopped,
    /// Terminal: discovery failed
    Failed,
    /// Loaded from a file; never probes
    Replay,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed | Self::Replay)
    }
}

/// A discovery-plus-probing run against one target
#[derive(Debug, Clone)]
pub struct Session {
    /// Config with `target` already resolved to an IP literal
    pub config: SessionConfig,
    pub target: IpAddr,
    pub started_at: DateTime<Utc>,
    pub state: SessionState,
    /// Hop number at which the target answered, if it did
    pub dest_hop: Option<u8>,
    hops: BTreeMap<u8, HopRecord>,
    frozen: bool,
}

impl Session {
    pub fn new(config: SessionConfig, target: IpAddr) -> Self {
        Self {
            config: SessionConfig {
                target: target.to_string(),
                ..config
            },
            target,
            started_at: Utc::now(),
            state: SessionState::Discovering,
            dest_hop: None,
            hops: BTreeMap::new(),
            frozen: false,
        }
    }

    /// Rebuild a finished session from stored hop records
    pub fn from_records(config: SessionConfig, target: IpAddr, records: Vec<HopRecord>) -> Self {
        let mut session = Self::new(config, target);
        for record in records {
            if record.ip() == target && session.dest_hop.is_none() {
                session.dest_hop = Some(record.hop_number());
            }
            session.hops.insert(record.hop_number(), record);
        }
        session.state = SessionState::Replay;
        session.frozen = true;
        session
    }

    /// Hop by hop number
    pub fn hop(&self, hop_number: u8) -> Option<&HopRecord> {
        self.hops.get(&hop_number)
    }

    /// Mutable hop by hop number; None once the session is frozen
    pub fn hop_mut(&mut self, hop_number: u8) -> Option<&mut HopRecord> {
        if self.frozen {
            return None;
        }
        self.hops.get_mut(&hop_number)
    }

    /// Add a newly discovered hop. Returns false if frozen or already present.
    pub fn insert_hop(&mut self, record: HopRecord) -> bool {
        if self.frozen || self.hops.contains_key(&record.hop_number()) {
            return false;
        }
        self.hops.insert(record.hop_number(), record);
        true
    }

    /// Hops in ascending hop-number order
    pub fn hops(&self) -> impl Iterator<Item = &HopRecord> {
        self.hops.values()
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Hop number and IP of every live hop
    pub fn probe_targets(&self) -> Vec<(u8, IpAddr)> {
        self.hops
            .values()
            .map(|h| (h.hop_number(), h.ip()))
            .collect()
    }

    pub fn snapshots(&self) -> Vec<HopSnapshot> {
        self.hops.values().map(HopRecord::snapshot).collect()
    }

    pub fn total_pings(&self) -> usize {
        self.hops.values().map(|h| h.history().len()).sum()
    }

    /// Enter a terminal state; no hop can be added or mutated afterwards
    pub fn freeze(&mut self, state: SessionState) {
        self.frozen = true;
        self.state = state;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Free every hop's history
    pub fn release(&mut self) {
        self.frozen = true;
        for hop in self.hops.values_mut() {
            hop.release();
        }
    }
}
