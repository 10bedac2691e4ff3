// Public API - engine, data types and export functions
pub mod config;
pub mod export;
pub mod lookup;
pub mod probe;
pub mod state;
pub mod trace;

pub use config::{DiscoveryMode, EngineOptions, SessionConfig};
pub use trace::{SessionController, SessionError, SessionEvent};
