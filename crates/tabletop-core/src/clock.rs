//! Clock abstraction for deterministic timestamps.

use chrono::{DateTime, Utc};

/// Abstraction over system time. Every timestamp the engine emits (event
/// metadata, outbound payloads, GM status transitions, queued actions) is
/// read from a `Clock`.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current time as milliseconds since the Unix epoch, the
    /// unit used on the wire.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
