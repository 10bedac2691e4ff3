use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::probe::Platform;

/// How hops are discovered before continuous probing starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// One traceroute invocation per TTL, batched and run concurrently
    #[default]
    PerTtl,
    /// A single traceroute invocation covering every TTL
    Aggregate,
}

/// Per-session configuration. This is what gets persisted with a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Target IP or hostname (always an IP once the session has started)
    pub target: String,
    /// Maximum hop count
    pub max_hops: u8,
    /// Per-probe timeout in milliseconds
    pub timeout: u64,
    /// Probes per hop for the traceroute backend
    pub probes_per_hop: u8,
}

impl SessionConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Probe timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            max_hops: 30,
            timeout: 5000,
            probes_per_hop: 3,
        }
    }
}

/// Runtime knobs for the engine. Never persisted.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Output/command dialect, selected once at startup
    pub platform: Platform,
    pub discovery: DiscoveryMode,
    /// Number of TTLs probed concurrently during discovery
    pub batch_size: u8,
    /// Consecutive silent TTLs after which discovery gives up
    pub max_consecutive_failures: u8,
    /// Period of the continuous probe cycle
    pub probe_interval: Duration,
    /// Resolve hop hostnames
    pub dns_enabled: bool,
    /// Stop after this many probe cycles (None = until stopped)
    pub max_cycles: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            discovery: DiscoveryMode::PerTtl,
            batch_size: 15,
            max_consecutive_failures: 3,
            probe_interval: Duration::from_secs(1),
            dns_enabled: true,
            max_cycles: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_uses_file_field_names() {
        let config = SessionConfig::new("10.0.0.1");
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(
            json,
            r#"{"target":"10.0.0.1","maxHops":30,"timeout":5000,"probesPerHop":3}"#
        );
    }

    #[test]
    fn test_timeout_duration() {
        let config = SessionConfig {
            timeout: 1500,
            ..SessionConfig::default()
        };
        assert_eq!(config.timeout_duration(), Duration::from_millis(1500));
    }
}
