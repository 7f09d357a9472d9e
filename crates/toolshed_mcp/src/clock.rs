//! Injectable time source for the cache and rate limiter.
//!
//! Production code uses [`SystemClock`]; tests use [`ManualClock`] to step
//! time deterministically past TTLs and refill intervals.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// Source of "now" for time-dependent subsystems.
pub trait TimeSource: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> SystemTime;
}

/// The real system clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    /// Create a clock frozen at the given instant.
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock frozen at the real current time.
    pub fn from_system_now() -> Self {
        Self::new(SystemTime::now())
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().expect("Clock lock poisoned");
        *now += delta;
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().expect("Clock lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(SystemTime::UNIX_EPOCH);
        assert_eq!(clock.now(), SystemTime::UNIX_EPOCH);

        clock.advance(Duration::from_secs(90));
        assert_eq!(
            clock.now(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(90)
        );
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
