pub mod context;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod events;
pub mod prober;

pub use context::SessionContext;
pub use controller::{SessionController, SessionStatus};
pub use discovery::{Discovery, DiscoveryOutcome};
pub use error::SessionError;
pub use events::{EventSink, Notifier, Phase, Progress, SessionEvent};
pub use prober::{Prober, interpret_ping};
