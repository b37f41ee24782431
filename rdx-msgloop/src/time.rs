//! The monotonic millisecond clock all due times are measured against.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

#[inline]
pub(crate) fn duration_to_millis_saturating(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Monotonic clock counting whole milliseconds since its epoch.
///
/// The epoch is the instant the clock was created. Wall-clock time is never
/// consulted, so due times are immune to system clock adjustments.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose epoch is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// The process-wide clock shared by every loop.
    pub fn global() -> &'static MonotonicClock {
        static GLOBAL: OnceLock<MonotonicClock> = OnceLock::new();
        GLOBAL.get_or_init(MonotonicClock::new)
    }

    /// Milliseconds elapsed since the epoch.
    pub fn now_ms(&self) -> u64 {
        duration_to_millis_saturating(self.epoch.elapsed())
    }

    /// The due time `delay_ms` from now, saturating at `u64::MAX`.
    pub fn deadline_after(&self, delay_ms: u64) -> u64 {
        self.now_ms().saturating_add(delay_ms)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
