//! Continuous probing of every discovered hop.
//!
//! One cycle pings all hops concurrently. A cycle always runs to completion
//! before the next tick is taken, and ticks missed meanwhile are skipped, so
//! each hop gets at most one probe per period and its history stays ordered
//! by send time.

use chrono::Utc;
use log::{debug, info};
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

use super::context::SessionContext;
use super::events::{Phase, Progress, SessionEvent};
use crate::lookup::Resolve;
use crate::probe::{CommandOutput, CommandRunner, Platform};
use crate::state::{Millis, PingEvent};

/// Turn ping output into a probe outcome.
///
/// When the tool exited cleanly but printed no parseable time, the wall
/// clock around the invocation stands in for the RTT.
pub fn interpret_ping(
    platform: Platform,
    output: &CommandOutput,
    elapsed: Duration,
    sent_at: Millis,
) -> PingEvent {
    if let Some(rtt) = platform.parse_ping_rtt(&output.stdout) {
        PingEvent::success(sent_at, rtt)
    } else if output.success() && !platform.ping_reports_failure(&output.stdout) {
        PingEvent::success(sent_at, elapsed.as_secs_f64() * 1000.0)
    } else {
        PingEvent::timeout(sent_at)
    }
}

pub struct Prober<R, D> {
    ctx: SessionContext<R, D>,
}

impl<R: CommandRunner, D: Resolve> Prober<R, D> {
    pub fn new(ctx: SessionContext<R, D>) -> Self {
        Self { ctx }
    }

    /// Run until the session is cancelled or the cycle limit is reached
    pub async fn run(&self) {
        let hop_count = self.ctx.session.read().hop_count();
        self.ctx.emit_live(SessionEvent::Progress(Progress {
            current_hop: 0,
            max_hops: u8::try_from(hop_count).unwrap_or(u8::MAX),
            current_ip: None,
            phase: Phase::Probing,
        }));
        info!("probing {} hops every {:?}", hop_count, self.ctx.options.probe_interval);

        let mut interval = tokio::time::interval(self.ctx.options.probe_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles: u64 = 0;

        loop {
            tokio::select! {
                _ = self.ctx.cancel.cancelled() => {
                    break;
                }
                _ = interval.tick() => {
                    if let Some(limit) = self.ctx.options.max_cycles
                        && cycles >= limit
                    {
                        break;
                    }
                    self.run_cycle().await;
                    cycles += 1;
                }
            }
        }
    }

    async fn run_cycle(&self) {
        let targets = self.ctx.session.read().probe_targets();
        let mut handles = Vec::with_capacity(targets.len());

        for (hop_number, ip) in targets {
            if !self.ctx.is_running() {
                break;
            }
            let ctx = self.ctx.clone();
            // Spawned so a stop lets in-flight pings finish on their own
            handles.push(tokio::spawn(async move {
                probe_hop(&ctx, hop_number, ip).await;
            }));
        }

        futures::future::join_all(handles).await;
    }
}

async fn probe_hop<R: CommandRunner, D: Resolve>(
    ctx: &SessionContext<R, D>,
    hop_number: u8,
    ip: IpAddr,
) {
    let platform = ctx.options.platform;
    let command = platform.ping(ip, ctx.config.timeout);
    let sent_at = Utc::now().timestamp_millis();
    let started = Instant::now();

    let event = match ctx.runner.run(command, ctx.config.timeout_duration()).await {
        Ok(output) => interpret_ping(platform, &output, started.elapsed(), sent_at),
        Err(e) => {
            debug!("ping {} (hop {}): {}", ip, hop_number, e);
            PingEvent::timeout(sent_at)
        }
    };

    // Emitted under the lock so nothing can follow the freeze in `finish`
    let mut session = ctx.session.write();
    let Some(hop) = session.hop_mut(hop_number) else {
        return;
    };
    if hop.record(event).is_none() {
        return;
    }
    let snapshot = hop.snapshot();
    ctx.emit(SessionEvent::PingResult {
        hop_number,
        target_ip: ip,
        event,
    });
    ctx.emit(SessionEvent::HopUpdated(snapshot));
}
