//! Injectable wall-clock time.
//!
//! The access gate's 24 hour session window is the only place the engine
//! cares about real time; routing it through a trait lets tests simulate
//! elapsed hours without sleeping.

/// A source of wall-clock time in epoch milliseconds.
pub trait Clock {
    /// Current time as milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
