use log::debug;
use parking_lot::RwLock;
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::events::{Notifier, SessionEvent};
use crate::config::{EngineOptions, SessionConfig};
use crate::lookup::Resolve;
use crate::probe::CommandRunner;
use crate::state::{Session, SessionState};

/// Everything the discovery and probing tasks of one session share
pub struct SessionContext<R, D> {
    pub runner: Arc<R>,
    pub resolver: Arc<D>,
    pub options: EngineOptions,
    /// Session config with the target already resolved
    pub config: SessionConfig,
    pub target: IpAddr,
    pub session: Arc<RwLock<Session>>,
    pub notifier: Arc<Notifier>,
    /// The session-wide running flag
    pub cancel: CancellationToken,
}

impl<R, D> Clone for SessionContext<R, D> {
    fn clone(&self) -> Self {
        Self {
            runner: self.runner.clone(),
            resolver: self.resolver.clone(),
            options: self.options.clone(),
            config: self.config.clone(),
            target: self.target,
            session: self.session.clone(),
            notifier: self.notifier.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<R: CommandRunner, D: Resolve> SessionContext<R, D> {
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn emit(&self, event: SessionEvent) {
        self.notifier.emit(event);
    }

    /// Emit unless the session has already been frozen
    pub fn emit_live(&self, event: SessionEvent) {
        let session = self.session.read();
        if !session.is_frozen() {
            self.notifier.emit(event);
        }
    }

    /// Resolve a hop's hostname in the background and report it when it
    /// arrives. Discovery never waits on DNS.
    pub fn spawn_hostname_lookup(&self, hop_number: u8, ip: IpAddr) {
        let resolver = self.resolver.clone();
        let session = self.session.clone();
        let notifier = self.notifier.clone();

        tokio::spawn(async move {
            let Some(hostname) = resolver.reverse_lookup(ip).await else {
                return;
            };
            let mut session = session.write();
            let Some(hop) = session.hop_mut(hop_number) else {
                return;
            };
            if hop.set_hostname(&hostname).is_some() {
                debug!("hop {} ({}) is {}", hop_number, ip, hostname);
                notifier.emit(SessionEvent::HopUpdated(hop.snapshot()));
            }
        });
    }

    /// Move the session into a terminal state. Idempotent: only the first
    /// call freezes the session and, for a clean stop, reports completion.
    /// The consumer is detached afterwards either way.
    ///
    /// Every hop event is emitted while holding the session lock, and this
    /// freezes, completes and detaches under the same lock, so
    /// `SessionComplete` is always the last event delivered.
    pub fn finish(&self, state: SessionState) {
        self.cancel.cancel();
        let mut session = self.session.write();
        if !session.is_frozen() {
            session.freeze(state);
            if state == SessionState::Stopped {
                self.notifier.emit(SessionEvent::SessionComplete);
            }
        }
        self.notifier.detach();
    }
}
