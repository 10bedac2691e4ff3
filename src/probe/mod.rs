pub mod parse;
pub mod platform;
pub mod runner;

pub use parse::TracerouteHop;
pub use platform::Platform;
pub use runner::{CommandOutput, CommandRunner, ProbeCommand, ProbeError, ProcessRunner};
