use clap::Parser;
use std::time::Duration;

use hopwatch::config::{DiscoveryMode, EngineOptions, SessionConfig};
use hopwatch::state::Interval;

use crate::prefs::Prefs;

/// Continuous per-hop latency and loss monitoring built on the system's traceroute and ping
#[derive(Parser, Debug, Clone)]
#[command(name = "hopwatch")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target host to monitor (IP address or hostname)
    #[arg(required_unless_present = "replay")]
    pub target: Option<String>,

    /// Number of probe cycles to run (default: until Ctrl+C)
    #[arg(short = 'c', long = "count")]
    pub count: Option<u64>,

    /// Maximum hop count
    #[arg(short = 'm', long = "max-hops")]
    pub max_hops: Option<u8>,

    /// Per-probe timeout in milliseconds
    #[arg(short = 'w', long = "timeout")]
    pub timeout: Option<u64>,

    /// Probes per hop passed to traceroute
    #[arg(short = 'q', long = "probes")]
    pub probes_per_hop: Option<u8>,

    /// Seconds between probe cycles
    #[arg(short = 'p', long = "period")]
    pub period: Option<f64>,

    /// Discover all hops with a single traceroute run instead of one per TTL
    #[arg(long = "aggregate")]
    pub aggregate: bool,

    /// Skip reverse DNS lookups
    #[arg(long = "no-dns")]
    pub no_dns: bool,

    /// Save the session to this file when it ends
    #[arg(short = 'o', long = "output")]
    pub output: Option<String>,

    /// Load a saved session instead of probing
    #[arg(long = "replay", conflicts_with = "output")]
    pub replay: Option<String>,

    /// Hop to aggregate (replay mode)
    #[arg(long = "hop", requires = "replay")]
    pub hop: Option<u8>,

    /// Bucket width for --hop: second, minute, 5min, 15min, 30min, hour, 2hour
    #[arg(long = "interval", requires = "hop")]
    pub interval: Option<String>,

    /// Output JSON (one event per line while live)
    #[arg(long = "json")]
    pub json: bool,

    /// Output CSV (requires -c when live)
    #[arg(long = "csv")]
    pub csv: bool,

    /// Report mode (requires -c when live)
    #[arg(long = "report")]
    pub report: bool,

    /// Persist the given -m/-w/-q/-p/--aggregate/--no-dns as defaults
    #[arg(long = "save-prefs")]
    pub save_prefs: bool,
}

impl Args {
    /// Session config, with CLI values taking precedence over saved preferences
    pub fn session_config(&self, prefs: &Prefs) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            target: self.target.clone().unwrap_or_default(),
            max_hops: self.max_hops.or(prefs.max_hops).unwrap_or(defaults.max_hops),
            timeout: self.timeout.or(prefs.timeout_ms).unwrap_or(defaults.timeout),
            probes_per_hop: self
                .probes_per_hop
                .or(prefs.probes_per_hop)
                .unwrap_or(defaults.probes_per_hop),
        }
    }

    pub fn engine_options(&self, prefs: &Prefs) -> EngineOptions {
        let defaults = EngineOptions::default();
        let discovery = if self.aggregate {
            DiscoveryMode::Aggregate
        } else {
            prefs.discovery.unwrap_or(defaults.discovery)
        };
        EngineOptions {
            discovery,
            probe_interval: self
                .period
                .or(prefs.period_secs)
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.probe_interval),
            dns_enabled: !self.no_dns && prefs.dns.unwrap_or(true),
            max_cycles: self.count,
            ..defaults
        }
    }

    /// Check if final output is a summary printed once the session ends
    pub fn is_batch_mode(&self) -> bool {
        self.csv || self.report
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.replay.is_none() && self.is_batch_mode() && self.count.is_none() {
            return Err("Summary output modes (--csv, --report) require -c to be set".into());
        }

        if [self.json, self.csv, self.report].iter().filter(|&&b| b).count() > 1 {
            return Err("Choose at most one of --json, --csv, --report".into());
        }

        if self.count == Some(0) {
            return Err("Count must be at least 1".into());
        }

        if let Some(period) = self.period
            && !(period.is_finite() && period > 0.0)
        {
            return Err("Period must be positive".into());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be positive".into());
        }

        if let Some(max_hops) = self.max_hops {
            check_max_hops(max_hops)?;
        }

        if let Some(probes) = self.probes_per_hop
            && !(1..=MAX_PROBES_PER_HOP).contains(&probes)
        {
            return Err(format!("Probes per hop must be between 1 and {}", MAX_PROBES_PER_HOP));
        }

        if let Some(ref interval) = self.interval {
            interval.parse::<Interval>().map_err(|e| e.to_string())?;
        }

        if let Some(ref target) = self.target
            && target.trim().is_empty()
        {
            return Err("Target cannot be empty".into());
        }

        Ok(())
    }
}

/// Upper bound to keep discovery from spawning hundreds of traceroutes
pub const MAX_SAFE_HOPS: u8 = 64;
pub const MAX_PROBES_PER_HOP: u8 = 10;

pub fn check_max_hops(max_hops: u8) -> Result<(), String> {
    if max_hops == 0 {
        return Err("Max hops must be at least 1".into());
    }
    if max_hops > MAX_SAFE_HOPS {
        return Err(format!("Max hops cannot exceed {}", MAX_SAFE_HOPS));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("hopwatch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_target_or_replay_required() {
        assert!(Args::try_parse_from(["hopwatch"]).is_err());
        assert!(Args::try_parse_from(["hopwatch", "--replay", "s.json"]).is_ok());
    }

    #[test]
    fn test_hop_requires_replay() {
        assert!(Args::try_parse_from(["hopwatch", "example.com", "--hop", "3"]).is_err());
        let args = parse(&["--replay", "s.json", "--hop", "3", "--interval", "5min"]);
        assert_eq!(args.hop, Some(3));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(parse(&["example.com"]).validate().is_ok());
        assert!(parse(&["example.com", "--report"]).validate().is_err());
        assert!(parse(&["example.com", "--report", "-c", "5"]).validate().is_ok());
        assert!(parse(&["example.com", "-m", "0"]).validate().is_err());
        assert!(parse(&["example.com", "-m", "65"]).validate().is_err());
        assert!(parse(&["example.com", "-w", "0"]).validate().is_err());
        assert!(parse(&["example.com", "-p", "0"]).validate().is_err());
        assert!(parse(&["example.com", "-q", "0"]).validate().is_err());
        assert!(parse(&["example.com", "--json", "--csv", "-c", "1"]).validate().is_err());
        assert!(
            parse(&["--replay", "s.json", "--hop", "1", "--interval", "fortnight"])
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_cli_overrides_prefs() {
        let prefs = Prefs {
            max_hops: Some(20),
            timeout_ms: Some(2000),
            probes_per_hop: None,
            period_secs: Some(2.0),
            dns: Some(false),
            discovery: Some(DiscoveryMode::Aggregate),
        };
        let args = parse(&["example.com", "-m", "12"]);

        let config = args.session_config(&prefs);
        assert_eq!(config.target, "example.com");
        assert_eq!(config.max_hops, 12);
        assert_eq!(config.timeout, 2000);
        assert_eq!(config.probes_per_hop, 3);

        let options = args.engine_options(&prefs);
        assert_eq!(options.discovery, DiscoveryMode::Aggregate);
        assert_eq!(options.probe_interval, Duration::from_secs(2));
        assert!(!options.dns_enabled);
        assert_eq!(options.max_cycles, None);
    }

    #[test]
    fn test_builtin_defaults() {
        let args = parse(&["example.com", "--no-dns", "-c", "4"]);
        let config = args.session_config(&Prefs::default());
        assert_eq!(config, SessionConfig::new("example.com"));

        let options = args.engine_options(&Prefs::default());
        assert_eq!(options.discovery, DiscoveryMode::PerTtl);
        assert_eq!(options.probe_interval, Duration::from_secs(1));
        assert!(!options.dns_enabled);
        assert_eq!(options.max_cycles, Some(4));
    }
}
