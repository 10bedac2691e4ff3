//! Time-bucketed statistics over a hop's ping history.
//!
//! Buckets are derived on demand and never stored. An event belongs to the
//! bucket starting at `floor(sent_at / width) * width`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::hop::{Millis, PingEvent};

/// Most recent buckets kept at one-second resolution
pub const SECOND_BUCKET_LIMIT: usize = 120;

/// Supported bucket widths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "second")]
    Second,
    #[serde(rename = "minute")]
    Minute,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "hour")]
    Hour,
    #[serde(rename = "2hour")]
    TwoHours,
}

impl Interval {
    pub const ALL: [Interval; 7] = [
        Interval::Second,
        Interval::Minute,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::Hour,
        Interval::TwoHours,
    ];

    /// Bucket width in milliseconds
    pub fn width_ms(&self) -> Millis {
        let secs = match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::FiveMinutes => 300,
            Self::FifteenMinutes => 900,
            Self::ThirtyMinutes => 1800,
            Self::Hour => 3600,
            Self::TwoHours => 7200,
        };
        secs * 1000
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::FiveMinutes => "5min",
            Self::FifteenMinutes => "15min",
            Self::ThirtyMinutes => "30min",
            Self::Hour => "hour",
            Self::TwoHours => "2hour",
        }
    }

    /// Display density cap; the history itself is untouched
    pub fn bucket_limit(&self) -> Option<usize> {
        match self {
            Self::Second => Some(SECOND_BUCKET_LIMIT),
            _ => None,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown interval: {0}")]
pub struct UnknownInterval(pub String);

impl FromStr for Interval {
    type Err = UnknownInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|i| i.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownInterval(s.to_string()))
    }
}

/// Statistics for one time bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    #[serde(rename = "timestamp")]
    pub bucket_start: Millis,
    #[serde(rename = "averageResponseTime")]
    pub avg_rtt: Option<f64>,
    #[serde(rename = "minResponseTime")]
    pub min_rtt: Option<f64>,
    #[serde(rename = "maxResponseTime")]
    pub max_rtt: Option<f64>,
    #[serde(rename = "successfulPings")]
    pub success_count: u64,
    #[serde(rename = "failedPings")]
    pub failure_count: u64,
    #[serde(rename = "totalPings")]
    pub total_count: u64,
    #[serde(rename = "hasAnyTimeout")]
    pub had_any_timeout: bool,
}

#[derive(Default)]
struct Accumulator {
    rtt_sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    success: u64,
    failure: u64,
}

impl Accumulator {
    fn add(&mut self, event: &PingEvent) {
        match event.round_trip_ms() {
            Some(rtt) => {
                self.success += 1;
                self.rtt_sum += rtt;
                self.min = Some(self.min.map_or(rtt, |m| m.min(rtt)));
                self.max = Some(self.max.map_or(rtt, |m| m.max(rtt)));
            }
            None => self.failure += 1,
        }
    }

    fn finish(self, bucket_start: Millis) -> Bucket {
        Bucket {
            bucket_start,
            avg_rtt: (self.success > 0).then(|| self.rtt_sum / self.success as f64),
            min_rtt: self.min,
            max_rtt: self.max,
            success_count: self.success,
            failure_count: self.failure,
            total_count: self.success + self.failure,
            had_any_timeout: self.failure > 0,
        }
    }
}

/// Group events into buckets of the given width, ascending by bucket start
pub fn aggregate(events: &[PingEvent], interval: Interval) -> Vec<Bucket> {
    let width = interval.width_ms();
    let mut buckets: BTreeMap<Millis, Accumulator> = BTreeMap::new();

    for event in events {
        let start = event.sent_at().div_euclid(width).saturating_mul(width);
        buckets.entry(start).or_default().add(event);
    }

    let skip = interval
        .bucket_limit()
        .map_or(0, |limit| buckets.len().saturating_sub(limit));

    buckets
        .into_iter()
        .skip(skip)
        .map(|(start, acc)| acc.finish(start))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_names_roundtrip() {
        for interval in Interval::ALL {
            assert_eq!(interval.name().parse::<Interval>(), Ok(interval));
        }
        assert_eq!("HOUR".parse::<Interval>(), Ok(Interval::Hour));
        assert_eq!(
            "fortnight".parse::<Interval>(),
            Err(UnknownInterval("fortnight".to_string()))
        );
    }

    #[test]
    fn test_interval_widths() {
        assert_eq!(Interval::Second.width_ms(), 1_000);
        assert_eq!(Interval::FiveMinutes.width_ms(), 300_000);
        assert_eq!(Interval::TwoHours.width_ms(), 7_200_000);
    }

    #[test]
    fn test_empty_history() {
        assert!(aggregate(&[], Interval::Minute).is_empty());
    }

    #[test]
    fn test_one_second_buckets() {
        let events = [
            PingEvent::from_timestamps(0, Some(10)),
            PingEvent::from_timestamps(1000, None),
            PingEvent::from_timestamps(2000, Some(2015)),
        ];
        let buckets = aggregate(&events, Interval::Second);
        assert_eq!(buckets.len(), 3);

        assert_eq!(buckets[0].bucket_start, 0);
        assert_eq!(buckets[0].avg_rtt, Some(10.0));
        assert_eq!(buckets[0].success_count, 1);
        assert_eq!(buckets[0].failure_count, 0);
        assert!(!buckets[0].had_any_timeout);

        assert_eq!(buckets[1].bucket_start, 1000);
        assert_eq!(buckets[1].avg_rtt, None);
        assert_eq!(buckets[1].success_count, 0);
        assert_eq!(buckets[1].failure_count, 1);
        assert!(buckets[1].had_any_timeout);

        assert_eq!(buckets[2].bucket_start, 2000);
        assert_eq!(buckets[2].avg_rtt, Some(15.0));
        assert_eq!(buckets[2].success_count, 1);
    }

    #[test]
    fn test_minute_bucket_stats() {
        let events = [
            PingEvent::from_timestamps(60_000, Some(60_010)),
            PingEvent::from_timestamps(61_000, Some(61_030)),
            PingEvent::from_timestamps(62_000, None),
            PingEvent::from_timestamps(125_000, Some(125_005)),
        ];
        let buckets = aggregate(&events, Interval::Minute);
        assert_eq!(buckets.len(), 2);

        let first = &buckets[0];
        assert_eq!(first.bucket_start, 60_000);
        assert_eq!(first.avg_rtt, Some(20.0));
        assert_eq!(first.min_rtt, Some(10.0));
        assert_eq!(first.max_rtt, Some(30.0));
        assert_eq!(first.total_count, 3);
        assert!(first.had_any_timeout);

        assert_eq!(buckets[1].bucket_start, 120_000);
        assert_eq!(buckets[1].total_count, 1);
    }

    #[test]
    fn test_every_event_in_exactly_one_bucket() {
        // Deliberately unordered, with gaps
        let events: Vec<PingEvent> = [7_300, 0, 59_999, 60_000, 3_600_000, 1_234_567, 42]
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                if i % 2 == 0 {
                    PingEvent::from_timestamps(s, Some(s + 3))
                } else {
                    PingEvent::timeout(s)
                }
            })
            .collect();

        for interval in Interval::ALL {
            let buckets = aggregate(&events, interval);
            let total: u64 = buckets.iter().map(|b| b.total_count).sum();
            assert_eq!(total, events.len() as u64, "{interval}");
            assert!(buckets.windows(2).all(|w| w[0].bucket_start < w[1].bucket_start));
            for b in &buckets {
                assert_eq!(b.bucket_start % interval.width_ms(), 0);
                assert_eq!(b.total_count, b.success_count + b.failure_count);
            }
        }
    }

    #[test]
    fn test_second_resolution_keeps_latest_120() {
        let events: Vec<PingEvent> = (0..500)
            .map(|i| PingEvent::from_timestamps(i * 1000, Some(i * 1000 + 1)))
            .collect();

        let buckets = aggregate(&events, Interval::Second);
        assert_eq!(buckets.len(), SECOND_BUCKET_LIMIT);
        assert_eq!(buckets[0].bucket_start, 380_000);
        assert_eq!(buckets.last().unwrap().bucket_start, 499_000);

        // Other resolutions are not capped
        let buckets = aggregate(&events, Interval::Minute);
        assert_eq!(buckets.len(), 9);
    }

    #[test]
    fn test_bucket_start_clamped_at_range_edge() {
        let events = [PingEvent::timeout(i64::MIN), PingEvent::timeout(-1)];
        let buckets = aggregate(&events, Interval::Second);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket_start, i64::MIN);
        assert_eq!(buckets[1].bucket_start, -1000);
    }

    #[test]
    fn test_bucket_serializes_with_display_names() {
        let buckets = aggregate(&[PingEvent::from_timestamps(0, Some(4))], Interval::Second);
        let json = serde_json::to_value(&buckets[0]).unwrap();
        assert_eq!(json["timestamp"], 0);
        assert_eq!(json["averageResponseTime"], 4.0);
        assert_eq!(json["hasAnyTimeout"], false);
    }
}
