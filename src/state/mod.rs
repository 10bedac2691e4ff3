pub mod aggregate;
pub mod hop;
pub mod session;

pub use aggregate::{Bucket, Interval, UnknownInterval, aggregate};
pub use hop::{HopChange, HopRecord, HopSnapshot, Millis, PingEvent};
pub use session::{Session, SessionState};
