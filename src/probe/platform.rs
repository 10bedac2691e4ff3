use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

use super::parse::{
    TracerouteHop, parse_ping_unix, parse_ping_windows, parse_traceroute_unix,
    parse_traceroute_windows, windows_ping_failed,
};
use super::runner::ProbeCommand;
use crate::config::SessionConfig;

/// Which family of system tools is used, and how their output reads.
///
/// Selected once when the engine is configured; everything platform
/// specific goes through here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// traceroute(8) / ping(8) on Linux, macOS and the BSDs
    Unix,
    /// tracert.exe / ping.exe
    Windows,
}

impl Platform {
    /// Platform of the running binary
    pub fn current() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Unix }
    }

    /// Traceroute limited to a single TTL
    pub fn traceroute_hop(&self, config: &SessionConfig, ttl: u8) -> ProbeCommand {
        match self {
            Self::Unix => ProbeCommand::new(
                "traceroute",
                [
                    "-n".to_string(),
                    "-w".to_string(),
                    "1".to_string(),
                    "-q".to_string(),
                    config.probes_per_hop.max(1).to_string(),
                    "-f".to_string(),
                    ttl.to_string(),
                    "-m".to_string(),
                    ttl.to_string(),
                    config.target.clone(),
                ],
            ),
            // tracert has no first-TTL option; the parser picks the wanted line
            Self::Windows => ProbeCommand::new(
                "tracert",
                [
                    "-d".to_string(),
                    "-h".to_string(),
                    ttl.to_string(),
                    "-w".to_string(),
                    config.timeout.to_string(),
                    config.target.clone(),
                ],
            ),
        }
    }

    /// How long a single-TTL traceroute may run. tracert walks every hop up
    /// to `ttl`, so it gets one probe timeout per hop.
    pub fn traceroute_hop_timeout(&self, config: &SessionConfig, ttl: u8) -> Duration {
        match self {
            Self::Unix => config.timeout_duration(),
            Self::Windows => config.timeout_duration() * u32::from(ttl.max(1)),
        }
    }

    /// Traceroute covering every TTL up to `max_hops`
    pub fn traceroute_all(&self, config: &SessionConfig) -> ProbeCommand {
        match self {
            Self::Unix => ProbeCommand::new(
                "traceroute",
                [
                    "-n".to_string(),
                    "-w".to_string(),
                    "1".to_string(),
                    "-q".to_string(),
                    config.probes_per_hop.max(1).to_string(),
                    "-m".to_string(),
                    config.max_hops.to_string(),
                    config.target.clone(),
                ],
            ),
            Self::Windows => ProbeCommand::new(
                "tracert",
                [
                    "-d".to_string(),
                    "-h".to_string(),
                    config.max_hops.to_string(),
                    "-w".to_string(),
                    config.timeout.to_string(),
                    config.target.clone(),
                ],
            ),
        }
    }

    /// A single echo request
    pub fn ping(&self, ip: IpAddr, timeout_ms: u64) -> ProbeCommand {
        match self {
            Self::Unix => {
                let secs = timeout_ms.div_ceil(1000).max(1);
                ProbeCommand::new(
                    "ping",
                    [
                        "-n".to_string(),
                        "-c".to_string(),
                        "1".to_string(),
                        "-W".to_string(),
                        secs.to_string(),
                        ip.to_string(),
                    ],
                )
            }
            Self::Windows => ProbeCommand::new(
                "ping",
                [
                    "-n".to_string(),
                    "1".to_string(),
                    "-w".to_string(),
                    timeout_ms.max(1).to_string(),
                    ip.to_string(),
                ],
            ),
        }
    }

    pub fn parse_traceroute(&self, text: &str) -> Vec<TracerouteHop> {
        match self {
            Self::Unix => parse_traceroute_unix(text),
            Self::Windows => parse_traceroute_windows(text),
        }
    }

    pub fn parse_ping_rtt(&self, text: &str) -> Option<f64> {
        match self {
            Self::Unix => parse_ping_unix(text),
            Self::Windows => parse_ping_windows(text),
        }
    }

    /// Whether a ping that exited cleanly still reports a failed echo
    pub fn ping_reports_failure(&self, text: &str) -> bool {
        match self {
            Self::Unix => false,
            Self::Windows => windows_ping_failed(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn config() -> SessionConfig {
        SessionConfig {
            target: "8.8.8.8".to_string(),
            max_hops: 20,
            timeout: 2500,
            probes_per_hop: 2,
        }
    }

    #[test]
    fn test_unix_hop_command() {
        let cmd = Platform::Unix.traceroute_hop(&config(), 7);
        assert_eq!(cmd.program, "traceroute");
        assert_eq!(cmd.arg_after("-f"), Some("7"));
        assert_eq!(cmd.arg_after("-m"), Some("7"));
        assert_eq!(cmd.arg_after("-q"), Some("2"));
        assert_eq!(cmd.args.last().map(String::as_str), Some("8.8.8.8"));
    }

    #[test]
    fn test_windows_hop_command() {
        let cmd = Platform::Windows.traceroute_hop(&config(), 4);
        assert_eq!(cmd.program, "tracert");
        assert_eq!(cmd.arg_after("-h"), Some("4"));
        assert_eq!(cmd.arg_after("-w"), Some("2500"));
    }

    #[test]
    fn test_hop_timeout_scales_with_ttl_on_windows() {
        let config = config();
        assert_eq!(
            Platform::Unix.traceroute_hop_timeout(&config, 12),
            config.timeout_duration()
        );
        assert_eq!(
            Platform::Windows.traceroute_hop_timeout(&config, 1),
            config.timeout_duration()
        );
        assert_eq!(
            Platform::Windows.traceroute_hop_timeout(&config, 12),
            config.timeout_duration() * 12
        );
    }

    #[test]
    fn test_aggregate_command_covers_all_hops() {
        let cmd = Platform::Unix.traceroute_all(&config());
        assert_eq!(cmd.arg_after("-m"), Some("20"));
        assert_eq!(cmd.arg_after("-f"), None);
    }

    #[test]
    fn test_ping_timeout_rounds_up_to_seconds() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let cmd = Platform::Unix.ping(ip, 2500);
        assert_eq!(cmd.arg_after("-W"), Some("3"));
        let cmd = Platform::Windows.ping(ip, 2500);
        assert_eq!(cmd.arg_after("-w"), Some("2500"));
    }

    #[test]
    fn test_dispatch_to_parsers() {
        let unix = " 1  10.0.0.1  1.0 ms\n";
        assert_eq!(Platform::Unix.parse_traceroute(unix).len(), 1);
        assert_eq!(Platform::Windows.parse_ping_rtt("Zeit=7ms"), Some(7.0));
        assert!(!Platform::Unix.ping_reports_failure("Destination host unreachable"));
    }
}
