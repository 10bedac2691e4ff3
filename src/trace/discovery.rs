//! Hop discovery.
//!
//! TTLs are probed in fixed-size batches. Within a batch every TTL runs
//! concurrently and results arrive in completion order, but hops are
//! announced strictly in ascending TTL order: a hop is only reported once
//! every lower TTL in the batch has been accounted for.

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info};
use std::collections::BTreeMap;
use std::net::IpAddr;

use super::context::SessionContext;
use super::error::SessionError;
use super::events::{Phase, Progress, SessionEvent};
use crate::config::DiscoveryMode;
use crate::lookup::Resolve;
use crate::probe::CommandRunner;
use crate::state::HopRecord;

/// Why discovery ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// The target answered at this hop
    TargetReached(u8),
    /// Too many consecutive silent TTLs, ending at this one
    Unreachable(u8),
    /// Every TTL up to the maximum was tried
    Exhausted,
    /// The session was stopped
    Cancelled,
}

/// Stop conditions shared by both discovery modes
struct StopRules {
    target: IpAddr,
    limit: u8,
    consecutive_failures: u8,
}

impl StopRules {
    fn observe(&mut self, ttl: u8, ip: Option<IpAddr>) -> Option<DiscoveryOutcome> {
        match ip {
            Some(ip) => {
                self.consecutive_failures = 0;
                (ip == self.target).then_some(DiscoveryOutcome::TargetReached(ttl))
            }
            None => {
                self.consecutive_failures += 1;
                (self.consecutive_failures >= self.limit)
                    .then_some(DiscoveryOutcome::Unreachable(ttl))
            }
        }
    }
}

pub struct Discovery<R, D> {
    ctx: SessionContext<R, D>,
}

impl<R: CommandRunner, D: Resolve> Discovery<R, D> {
    pub fn new(ctx: SessionContext<R, D>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self) -> Result<DiscoveryOutcome, SessionError> {
        self.progress(0, Some(self.ctx.target));

        let mut rules = StopRules {
            target: self.ctx.target,
            limit: self.ctx.options.max_consecutive_failures.max(1),
            consecutive_failures: 0,
        };

        let outcome = match self.ctx.options.discovery {
            DiscoveryMode::PerTtl => self.run_batched(&mut rules).await,
            DiscoveryMode::Aggregate => self.run_aggregate(&mut rules).await?,
        };

        if let DiscoveryOutcome::TargetReached(ttl) = outcome {
            self.ctx.session.write().dest_hop = Some(ttl);
        }
        info!(
            "discovery for {} finished: {:?}",
            self.ctx.target, outcome
        );
        Ok(outcome)
    }

    async fn run_batched(&self, rules: &mut StopRules) -> DiscoveryOutcome {
        let max_hops = u16::from(self.ctx.config.max_hops);
        let batch_size = u16::from(self.ctx.options.batch_size.max(1));
        let mut first: u16 = 1;

        while first <= max_hops {
            if !self.ctx.is_running() {
                return DiscoveryOutcome::Cancelled;
            }

            let last = (first + batch_size - 1).min(max_hops);
            debug!("probing TTLs {}..={}", first, last);

            let mut pending: FuturesUnordered<_> =
                (first..=last).map(|ttl| self.probe_ttl(ttl as u8)).collect();
            let mut completed: BTreeMap<u16, Option<IpAddr>> = BTreeMap::new();
            let mut next = first;

            while let Some((ttl, ip)) = pending.next().await {
                completed.insert(u16::from(ttl), ip);

                // Release the contiguous prefix that is now complete
                while let Some(ip) = completed.remove(&next) {
                    if !self.ctx.is_running() {
                        return DiscoveryOutcome::Cancelled;
                    }
                    if let Some(outcome) = self.settle(next as u8, ip, rules) {
                        return outcome;
                    }
                    next += 1;
                }
            }

            first = last + 1;
        }

        DiscoveryOutcome::Exhausted
    }

    async fn run_aggregate(&self, rules: &mut StopRules) -> Result<DiscoveryOutcome, SessionError> {
        let config = &self.ctx.config;
        let command = self.ctx.options.platform.traceroute_all(config);
        let timeout = config.timeout_duration() * u32::from(config.max_hops.max(1));

        let output = self.ctx.runner.run(command, timeout).await?;
        let hops = self.ctx.options.platform.parse_traceroute(&output.stdout);
        if hops.is_empty() {
            let detail = output
                .stdout
                .lines()
                .chain(output.stderr.lines())
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no output")
                .trim()
                .to_string();
            return Err(SessionError::Parse(detail));
        }

        let found: BTreeMap<u8, IpAddr> = hops.into_iter().map(|h| (h.hop_number, h.ip)).collect();
        for ttl in 1..=config.max_hops {
            if !self.ctx.is_running() {
                return Ok(DiscoveryOutcome::Cancelled);
            }
            if let Some(outcome) = self.settle(ttl, found.get(&ttl).copied(), rules) {
                return Ok(outcome);
            }
        }
        Ok(DiscoveryOutcome::Exhausted)
    }

    /// Ask traceroute for exactly one TTL. Timeouts and spawn failures are
    /// just a TTL without an answer.
    async fn probe_ttl(&self, ttl: u8) -> (u8, Option<IpAddr>) {
        let platform = self.ctx.options.platform;
        let command = platform.traceroute_hop(&self.ctx.config, ttl);
        let timeout = platform.traceroute_hop_timeout(&self.ctx.config, ttl);

        match self.ctx.runner.run(command, timeout).await
        {
            Ok(output) => {
                let ip = platform
                    .parse_traceroute(&output.stdout)
                    .into_iter()
                    .find(|hop| hop.hop_number == ttl)
                    .map(|hop| hop.ip);
                (ttl, ip)
            }
            Err(e) => {
                debug!("traceroute TTL {}: {}", ttl, e);
                (ttl, None)
            }
        }
    }

    /// Announce one TTL's result in order, then apply the stop rules
    fn settle(&self, ttl: u8, ip: Option<IpAddr>, rules: &mut StopRules) -> Option<DiscoveryOutcome> {
        if let Some(ip) = ip {
            self.announce(ttl, ip);
        }
        self.progress(ttl, ip);
        rules.observe(ttl, ip)
    }

    fn announce(&self, ttl: u8, ip: IpAddr) {
        let record = HopRecord::new(ttl, ip);
        let snapshot = record.snapshot();
        {
            let mut session = self.ctx.session.write();
            if !session.insert_hop(record) {
                return;
            }
            self.ctx.emit(SessionEvent::HopDiscovered(snapshot));
        }
        if self.ctx.options.dns_enabled {
            self.ctx.spawn_hostname_lookup(ttl, ip);
        }
    }

    fn progress(&self, current_hop: u8, current_ip: Option<IpAddr>) {
        self.ctx.emit_live(SessionEvent::Progress(Progress {
            current_hop,
            max_hops: self.ctx.config.max_hops,
            current_ip,
            phase: Phase::Discovery,
        }));
    }
}
