use thiserror::Error;

use crate::probe::ProbeError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not resolve hostname: {0}")]
    Resolution(String),
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("no session")]
    NotRunning,
    #[error("traceroute failed: {0}")]
    Traceroute(#[from] ProbeError),
    #[error("unrecognized traceroute output: {0}")]
    Parse(String),
    #[error("hop {0} not found")]
    UnknownHop(u8),
    #[error("unknown interval: {0}")]
    UnknownInterval(String),
}
