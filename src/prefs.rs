//! User preferences persistence.
//!
//! Saves default session settings to ~/.config/hopwatch/config.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use hopwatch::config::DiscoveryMode;

use crate::cli::{Args, MAX_PROBES_PER_HOP, check_max_hops};

/// User preferences. Unset fields fall back to built-in defaults.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hops: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probes_per_hop: Option<u8>,
    /// Seconds between probe cycles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_secs: Option<f64>,
    /// Reverse DNS lookups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryMode>,
}

impl Prefs {
    /// Get config file path: ~/.config/hopwatch/config.toml
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hopwatch").join("config.toml"))
    }

    /// Load preferences from disk (returns default if missing/invalid)
    pub fn load() -> Self {
        Self::path().map(|p| Self::load_from(&p)).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|s| toml::from_str::<Self>(&s).ok())
            .map(Self::sanitized)
            .unwrap_or_default()
    }

    /// Save preferences to disk
    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(path) = Self::path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Take every setting given on the command line
    pub fn update_from(&mut self, args: &Args) {
        if args.max_hops.is_some() {
            self.max_hops = args.max_hops;
        }
        if args.timeout.is_some() {
            self.timeout_ms = args.timeout;
        }
        if args.probes_per_hop.is_some() {
            self.probes_per_hop = args.probes_per_hop;
        }
        if args.period.is_some() {
            self.period_secs = args.period;
        }
        if args.no_dns {
            self.dns = Some(false);
        }
        if args.aggregate {
            self.discovery = Some(DiscoveryMode::Aggregate);
        }
    }

    /// Drop values the command line would have rejected
    fn sanitized(mut self) -> Self {
        if self.max_hops.is_some_and(|n| check_max_hops(n).is_err()) {
            self.max_hops = None;
        }
        if self.timeout_ms == Some(0) {
            self.timeout_ms = None;
        }
        if self
            .probes_per_hop
            .is_some_and(|n| !(1..=MAX_PROBES_PER_HOP).contains(&n))
        {
            self.probes_per_hop = None;
        }
        if self.period_secs.is_some_and(|p| !(p.is_finite() && p > 0.0)) {
            self.period_secs = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_prefs_default() {
        let prefs = Prefs::default();
        assert!(prefs.max_hops.is_none());
        assert!(prefs.discovery.is_none());
        assert_eq!(toml::to_string_pretty(&prefs).unwrap().trim(), "");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hopwatch").join("config.toml");
        let prefs = Prefs {
            max_hops: Some(20),
            timeout_ms: Some(1500),
            probes_per_hop: Some(1),
            period_secs: Some(0.5),
            dns: Some(false),
            discovery: Some(DiscoveryMode::Aggregate),
        };
        prefs.save_to(&path).unwrap();

        let toml_str = fs::read_to_string(&path).unwrap();
        assert!(toml_str.contains("max_hops = 20"));
        assert!(toml_str.contains("discovery = \"aggregate\""));
        assert_eq!(Prefs::load_from(&path), prefs);
    }

    #[test]
    fn test_missing_or_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(Prefs::load_from(&path), Prefs::default());

        fs::write(&path, "max_hops = \"lots\"").unwrap();
        assert_eq!(Prefs::load_from(&path), Prefs::default());
    }

    #[test]
    fn test_out_of_range_values_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_hops = 0\ntimeout_ms = 0\nperiod_secs = -1.0\ndns = true\n").unwrap();

        let prefs = Prefs::load_from(&path);
        assert_eq!(prefs.max_hops, None);
        assert_eq!(prefs.timeout_ms, None);
        assert_eq!(prefs.period_secs, None);
        assert_eq!(prefs.dns, Some(true));
    }

    #[test]
    fn test_update_from_args() {
        let args = Args::parse_from(["hopwatch", "example.com", "-m", "16", "--no-dns"]);
        let mut prefs = Prefs {
            timeout_ms: Some(900),
            ..Prefs::default()
        };
        prefs.update_from(&args);
        assert_eq!(prefs.max_hops, Some(16));
        assert_eq!(prefs.timeout_ms, Some(900));
        assert_eq!(prefs.dns, Some(false));
        assert_eq!(prefs.discovery, None);
    }
}
