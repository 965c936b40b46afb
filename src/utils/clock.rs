//! Wall-clock abstraction

use chrono::{DateTime, Utc};

/// Source of the current time for the timer engine. Swapped out in tests so
/// elapsed time can be driven by tokio's paused clock.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
