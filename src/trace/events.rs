//! Notifications sent to the consumer of a session.

use parking_lot::Mutex;
use serde::Serialize;
use std::net::IpAddr;
use tokio::sync::mpsc;

use crate::state::{HopSnapshot, PingEvent};

/// Receiving side handed to the consumer
pub type EventSink = mpsc::UnboundedSender<SessionEvent>;

/// Which phase a progress report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Discovery,
    Probing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current_hop: u8,
    pub max_hops: u8,
    pub current_ip: Option<IpAddr>,
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum SessionEvent {
    HopDiscovered(HopSnapshot),
    /// Hostname or reachability or counters changed
    HopUpdated(HopSnapshot),
    #[serde(rename_all = "camelCase")]
    PingResult {
        hop_number: u8,
        target_ip: IpAddr,
        event: PingEvent,
    },
    Progress(Progress),
    SessionComplete,
    SessionError(String),
}

/// Fan-in point for every notification of one session.
///
/// Detaching drops the sender; anything emitted afterwards is discarded, so
/// nothing reaches the consumer once a session has been torn down.
#[derive(Debug)]
pub struct Notifier {
    tx: Mutex<Option<EventSink>>,
}

impl Notifier {
    pub fn new(sink: EventSink) -> Self {
        Self {
            tx: Mutex::new(Some(sink)),
        }
    }

    /// A notifier with nobody listening
    pub fn detached() -> Self {
        Self {
            tx: Mutex::new(None),
        }
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = self.tx.lock().as_ref() {
            // A dropped receiver just means nobody is listening any more
            let _ = tx.send(event);
        }
    }

    pub fn detach(&self) {
        self.tx.lock().take();
    }

    pub fn is_attached(&self) -> bool {
        self.tx.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_detached_notifier_drops_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(tx);

        notifier.emit(SessionEvent::SessionComplete);
        notifier.detach();
        notifier.emit(SessionEvent::SessionError("late".into()));

        assert!(!notifier.is_attached());
        assert_eq!(rx.try_recv().ok(), Some(SessionEvent::SessionComplete));
        // Sender is gone, so the channel reports disconnection
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_wire_shape() {
        let event = SessionEvent::Progress(Progress {
            current_hop: 2,
            max_hops: 30,
            current_ip: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))),
            phase: Phase::Discovery,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["data"]["currentHop"], 2);
        assert_eq!(json["data"]["phase"], "discovery");

        let json = serde_json::to_value(SessionEvent::PingResult {
            hop_number: 4,
            target_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 4)),
            event: PingEvent::from_timestamps(100, Some(112)),
        })
        .unwrap();
        assert_eq!(json["type"], "ping-result");
        assert_eq!(json["data"]["targetIp"], "10.0.0.4");
        assert_eq!(json["data"]["event"]["roundTripMs"], 12.0);
    }
}
