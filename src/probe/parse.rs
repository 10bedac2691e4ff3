//! Text parsers for traceroute and ping output.
//!
//! Both parsers are lenient: lines that do not look like hop or reply lines
//! are skipped rather than treated as errors.

use regex::Regex;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::LazyLock;

/// A hop line: leading hop number followed by the rest of the line
static HOP_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,3})\s+(.+)$").expect("valid regex"));

/// Unix ping: "time=12.3 ms", "time<1 ms"
static UNIX_RTT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time[=<]\s*(\d+(?:\.\d+)?)\s*ms").expect("valid regex"));

/// Windows ping, English and German locales: "time=12ms", "Zeit<1ms", "Zeit=3,5ms"
static WINDOWS_RTT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:time|zeit)\s*[=<]\s*(\d+(?:[.,]\d+)?)\s*ms").expect("valid regex")
});

/// Windows ping reports these with exit code 0
const WINDOWS_FAILURE_MARKERS: &[&str] = &[
    "unreachable",
    "timed out",
    "nicht erreichbar",
    "zeitüberschreitung",
    "general failure",
];

/// A hop reported by traceroute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracerouteHop {
    pub hop_number: u8,
    pub ip: IpAddr,
}

fn parse_ip_token(token: &str) -> Option<IpAddr> {
    token
        .trim_matches(|c| matches!(c, '(' | ')' | '[' | ']' | ','))
        .parse()
        .ok()
}

/// Unix style: " 3  10.0.0.1  1.234 ms  1.101 ms  0.998 ms".
/// The first address after the hop number is the responder.
fn unix_hop_ip(rest: &str) -> Option<IpAddr> {
    rest.split_whitespace().find_map(parse_ip_token)
}

/// Windows style: "  2    <1 ms     1 ms    <1 ms  router.lan [192.168.1.1]".
/// The address is the last column.
fn windows_hop_ip(rest: &str) -> Option<IpAddr> {
    rest.split_whitespace().rev().find_map(parse_ip_token)
}

fn collect_hops(text: &str, extract: fn(&str) -> Option<IpAddr>) -> Vec<TracerouteHop> {
    let mut hops: BTreeMap<u8, IpAddr> = BTreeMap::new();

    for line in text.lines() {
        let Some(caps) = HOP_LINE.captures(line) else {
            continue;
        };
        let Ok(hop_number) = caps[1].parse::<u8>() else {
            continue;
        };
        if hop_number == 0 {
            continue;
        }
        if let Some(ip) = extract(&caps[2]) {
            // First match for a hop number wins
            hops.entry(hop_number).or_insert(ip);
        }
    }

    hops.into_iter()
        .map(|(hop_number, ip)| TracerouteHop { hop_number, ip })
        .collect()
}

/// Extract hops from Unix `traceroute -n` output
pub fn parse_traceroute_unix(text: &str) -> Vec<TracerouteHop> {
    collect_hops(text, unix_hop_ip)
}

/// Extract hops from Windows `tracert` output
pub fn parse_traceroute_windows(text: &str) -> Vec<TracerouteHop> {
    collect_hops(text, windows_hop_ip)
}

/// Round-trip time from Unix ping output
pub fn parse_ping_unix(text: &str) -> Option<f64> {
    UNIX_RTT
        .captures(text)
        .and_then(|caps| caps[1].parse::<f64>().ok())
}

/// Round-trip time from Windows ping output
pub fn parse_ping_windows(text: &str) -> Option<f64> {
    WINDOWS_RTT
        .captures(text)
        .and_then(|caps| caps[1].replace(',', ".").parse::<f64>().ok())
}

/// Whether Windows ping output describes a failed echo despite a zero exit code
pub fn windows_ping_failed(text: &str) -> bool {
    let lower = text.to_lowercase();
    WINDOWS_FAILURE_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_unix_traceroute() {
        let output = "\
traceroute to 8.8.8.8 (8.8.8.8), 30 hops max, 60 byte packets
 1  192.168.1.1  1.234 ms  1.101 ms  0.998 ms
 2  * * *
 3  10.20.0.1  8.410 ms * 9.002 ms
 4  8.8.8.8  12.5 ms  12.1 ms  12.9 ms
";
        let hops = parse_traceroute_unix(output);
        assert_eq!(
            hops,
            vec![
                TracerouteHop { hop_number: 1, ip: v4(192, 168, 1, 1) },
                TracerouteHop { hop_number: 3, ip: v4(10, 20, 0, 1) },
                TracerouteHop { hop_number: 4, ip: v4(8, 8, 8, 8) },
            ]
        );
    }

    #[test]
    fn test_unix_traceroute_with_names_and_continuation_lines() {
        let output = "\
 1  router.lan (192.168.1.1)  0.5 ms
 2  10.0.0.1  3.1 ms
    10.0.0.2  3.4 ms
";
        let hops = parse_traceroute_unix(output);
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].ip, v4(192, 168, 1, 1));
        assert_eq!(hops[1].ip, v4(10, 0, 0, 1));
    }

    #[test]
    fn test_unix_traceroute_ipv6() {
        let output = " 1  2001:db8::1  0.812 ms  0.701 ms  0.655 ms\n";
        let hops = parse_traceroute_unix(output);
        assert_eq!(hops[0].ip, IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)));
    }

    #[test]
    fn test_windows_tracert() {
        let output = "\
Tracing route to dns.google [8.8.8.8]
over a maximum of 30 hops:

  1    <1 ms    <1 ms    <1 ms  192.168.1.1
  2     8 ms     9 ms     8 ms  isp-gw.example.net [10.0.0.1]
  3     *        *        *     Request timed out.
  4    12 ms    11 ms    12 ms  8.8.8.8

Trace complete.
";
        let hops = parse_traceroute_windows(output);
        assert_eq!(
            hops,
            vec![
                TracerouteHop { hop_number: 1, ip: v4(192, 168, 1, 1) },
                TracerouteHop { hop_number: 2, ip: v4(10, 0, 0, 1) },
                TracerouteHop { hop_number: 4, ip: v4(8, 8, 8, 8) },
            ]
        );
    }

    #[test]
    fn test_traceroute_dedup_and_sort() {
        let output = " 3  10.0.0.3  1 ms\n 1  10.0.0.1  1 ms\n 3  10.0.0.99  1 ms\n";
        let hops = parse_traceroute_unix(output);
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].hop_number, 1);
        assert_eq!(hops[1].hop_number, 3);
        assert_eq!(hops[1].ip, v4(10, 0, 0, 3));
    }

    #[test]
    fn test_traceroute_garbage_is_empty() {
        assert!(parse_traceroute_unix("traceroute: unknown host nowhere").is_empty());
        assert!(parse_traceroute_windows("").is_empty());
    }

    #[test]
    fn test_ping_unix() {
        let output = "64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=12.34 ms";
        assert_eq!(parse_ping_unix(output), Some(12.34));
        assert_eq!(parse_ping_unix("64 bytes from 10.0.0.1: time<1 ms"), Some(1.0));
        assert_eq!(parse_ping_unix("1 packets transmitted, 0 received"), None);
    }

    #[test]
    fn test_ping_windows_locales() {
        assert_eq!(
            parse_ping_windows("Reply from 8.8.8.8: bytes=32 time=14ms TTL=117"),
            Some(14.0)
        );
        assert_eq!(
            parse_ping_windows("Antwort von 8.8.8.8: Bytes=32 Zeit=9ms TTL=117"),
            Some(9.0)
        );
        assert_eq!(
            parse_ping_windows("Antwort von 192.168.1.1: Bytes=32 Zeit<1ms TTL=64"),
            Some(1.0)
        );
        assert_eq!(parse_ping_windows("Request timed out."), None);
    }

    #[test]
    fn test_windows_failure_markers() {
        assert!(windows_ping_failed(
            "Reply from 10.0.0.1: Destination host unreachable."
        ));
        assert!(windows_ping_failed("Zeitüberschreitung der Anforderung."));
        assert!(!windows_ping_failed("Reply from 8.8.8.8: bytes=32 time=14ms TTL=117"));
    }
}
