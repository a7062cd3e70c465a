use std::time::Duration;

use tokio::time::Instant;

/// Protocol time unit. One tick is one millisecond.
pub type Tick = u64;

/// Signed difference between two ticks.
pub type TickDiff = i64;

pub const TICKS_PER_SECOND: Tick = 1000;

/// Monotonic tick source.
///
/// Backed by `tokio::time::Instant` so a paused runtime drives it in tests.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Clock {
        Clock {
            origin: Instant::now(),
        }
    }

    /// Ticks elapsed since the clock was created.
    pub fn now(&self) -> Tick {
        let elapsed = Instant::now().saturating_duration_since(self.origin);
        u64::try_from(elapsed.as_millis()).unwrap_or(Tick::MAX)
    }

    pub fn to_ticks(duration: Duration) -> Tick {
        u64::try_from(duration.as_millis()).unwrap_or(Tick::MAX)
    }

    pub fn to_duration(ticks: Tick) -> Duration {
        Duration::from_millis(ticks)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
