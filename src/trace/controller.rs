use log::{error, info};
use parking_lot::RwLock;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::context::SessionContext;
use super::discovery::{Discovery, DiscoveryOutcome};
use super::error::SessionError;
use super::events::{EventSink, Notifier, SessionEvent};
use super::prober::Prober;
use crate::config::{EngineOptions, SessionConfig};
use crate::lookup::{DnsLookup, Resolve};
use crate::probe::{CommandRunner, ProcessRunner};
use crate::state::{Bucket, HopRecord, HopSnapshot, Interval, PingEvent, Session, SessionState, aggregate};

/// Summary of the current session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: Option<SessionState>,
    pub hop_count: usize,
    pub ping_count: usize,
}

/// A session owned by the controller
struct ActiveSession<R, D> {
    ctx: SessionContext<R, D>,
    driver: Option<JoinHandle<()>>,
}

/// Top-level handle: starts, stops and answers queries about one session.
///
/// There is no global session; whoever owns the controller owns the session,
/// and a controller runs at most one session at a time.
pub struct SessionController<R: CommandRunner = ProcessRunner, D: Resolve = DnsLookup> {
    runner: Arc<R>,
    resolver: Arc<D>,
    options: EngineOptions,
    active: Option<ActiveSession<R, D>>,
}

impl SessionController<ProcessRunner, DnsLookup> {
    /// Controller backed by the system's traceroute, ping and DNS
    pub fn system(options: EngineOptions) -> Self {
        Self::new(ProcessRunner, DnsLookup::new(), options)
    }
}

impl<R: CommandRunner, D: Resolve> SessionController<R, D> {
    pub fn new(runner: R, resolver: D, options: EngineOptions) -> Self {
        Self {
            runner: Arc::new(runner),
            resolver: Arc::new(resolver),
            options,
            active: None,
        }
    }

    /// Controller over a loaded session. It answers queries but never probes.
    pub fn from_snapshot(
        runner: R,
        resolver: D,
        options: EngineOptions,
        config: SessionConfig,
        hops: Vec<HopRecord>,
    ) -> Self {
        let target = config
            .target
            .parse::<IpAddr>()
            .ok()
            .or_else(|| hops.last().map(HopRecord::ip))
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let mut controller = Self::new(runner, resolver, options);
        let session = Session::from_records(config, target, hops);
        let notifier = Notifier::detached();
        let cancel = CancellationToken::new();
        cancel.cancel();
        controller.active = Some(ActiveSession {
            ctx: controller.context(session.config.clone(), target, session, notifier, cancel),
            driver: None,
        });
        controller
    }

    fn context(
        &self,
        config: SessionConfig,
        target: IpAddr,
        session: Session,
        notifier: Notifier,
        cancel: CancellationToken,
    ) -> SessionContext<R, D> {
        SessionContext {
            runner: self.runner.clone(),
            resolver: self.resolver.clone(),
            options: self.options.clone(),
            config,
            target,
            session: Arc::new(RwLock::new(session)),
            notifier: Arc::new(notifier),
            cancel,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| !a.ctx.session.read().state.is_terminal())
    }

    /// Resolve the target, then run discovery followed by continuous probing
    /// in the background. Events go to `sink` until the session ends.
    pub async fn start(&mut self, config: SessionConfig, sink: EventSink) -> Result<(), SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }
        self.cleanup();

        let notifier = Notifier::new(sink);
        let target = match config.target.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => match self.resolver.lookup_host(&config.target).await {
                Some(ip) => ip,
                None => {
                    let err = SessionError::Resolution(config.target.clone());
                    notifier.emit(SessionEvent::SessionError(err.to_string()));
                    return Err(err);
                }
            },
        };
        info!("starting session for {} ({})", config.target, target);

        let session = Session::new(config, target);
        let ctx = self.context(
            session.config.clone(),
            target,
            session,
            notifier,
            CancellationToken::new(),
        );
        let driver = tokio::spawn(drive(ctx.clone()));
        self.active = Some(ActiveSession {
            ctx,
            driver: Some(driver),
        });
        Ok(())
    }

    /// Stop the session. The probe timer is gone and the consumer detached
    /// when this returns; pings already in flight finish but are discarded.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        let active = self.active.as_mut().ok_or(SessionError::NotRunning)?;
        active.ctx.cancel.cancel();
        if let Some(driver) = active.driver.take() {
            driver.abort();
        }
        active.ctx.finish(SessionState::Stopped);
        info!("session for {} stopped", active.ctx.target);
        Ok(())
    }

    /// Stop if needed and free all hop histories
    pub fn cleanup(&mut self) {
        if self.active.is_some() {
            let _ = self.stop();
        }
        if let Some(active) = self.active.take() {
            active.ctx.session.write().release();
        }
    }

    pub fn status(&self) -> SessionStatus {
        match &self.active {
            Some(active) => {
                let session = active.ctx.session.read();
                SessionStatus {
                    state: Some(session.state),
                    hop_count: session.hop_count(),
                    ping_count: session.total_pings(),
                }
            }
            None => SessionStatus {
                state: None,
                hop_count: 0,
                ping_count: 0,
            },
        }
    }

    /// Run `f` against the current session
    pub fn with_session<T>(&self, f: impl FnOnce(&Session) -> T) -> Option<T> {
        self.active.as_ref().map(|a| f(&*a.ctx.session.read()))
    }

    /// Snapshots of all hops, ascending by hop number
    pub fn hops(&self) -> Vec<HopSnapshot> {
        self.with_session(Session::snapshots).unwrap_or_default()
    }

    /// Raw ping history of one hop
    pub fn query_history(&self, hop_number: u8) -> Result<Vec<PingEvent>, SessionError> {
        self.with_hop(hop_number, |hop| hop.history().to_vec())
    }

    /// Bucketed statistics of one hop at a named resolution
    pub fn query_aggregated(&self, hop_number: u8, interval: &str) -> Result<Vec<Bucket>, SessionError> {
        let interval: Interval = interval
            .parse()
            .map_err(|_| SessionError::UnknownInterval(interval.to_string()))?;
        self.with_hop(hop_number, |hop| aggregate(hop.history(), interval))
    }

    /// Config and a consistent copy of every hop, for saving
    pub fn export_records(&self) -> Option<(SessionConfig, Vec<HopRecord>)> {
        self.with_session(|session| (session.config.clone(), session.hops().cloned().collect()))
    }

    fn with_hop<T>(&self, hop_number: u8, f: impl FnOnce(&HopRecord) -> T) -> Result<T, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NotRunning)?;
        let session = active.ctx.session.read();
        session
            .hop(hop_number)
            .map(f)
            .ok_or(SessionError::UnknownHop(hop_number))
    }
}

impl<R: CommandRunner, D: Resolve> Drop for SessionController<R, D> {
    fn drop(&mut self) {
        if let Some(active) = &mut self.active {
            active.ctx.cancel.cancel();
            if let Some(driver) = active.driver.take() {
                driver.abort();
            }
        }
    }
}

/// Session body: discovery, then probing until stopped
async fn drive<R: CommandRunner, D: Resolve>(ctx: SessionContext<R, D>) {
    match Discovery::new(ctx.clone()).run().await {
        Ok(DiscoveryOutcome::Cancelled) => return,
        Ok(_) => {}
        Err(e) => {
            error!("discovery for {} failed: {}", ctx.target, e);
            ctx.emit_live(SessionEvent::SessionError(e.to_string()));
            ctx.finish(SessionState::Failed);
            return;
        }
    }

    {
        let mut session = ctx.session.write();
        if session.is_frozen() {
            return;
        }
        session.state = SessionState::Probing;
    }

    Prober::new(ctx.clone()).run().await;

    // Only reached when the cycle limit ran out; a stop aborts this task
    ctx.finish(SessionState::Stopped);
}
