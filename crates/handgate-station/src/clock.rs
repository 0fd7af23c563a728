//! Frame clocks
//!
//! Live captures read the monotonic system clock. Replayed and scripted
//! frames carry no timing, so they run on a clock that advances one frame
//! interval per reading.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of frame timestamps
pub trait Clock: Send + Sync {
    /// Timestamp for the frame being processed
    fn now(&self) -> Instant;
}

/// Monotonic wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that advances a fixed step every time it is read
#[derive(Debug)]
pub struct SteppingClock {
    origin: Instant,
    step: Duration,
    ticks: AtomicU64,
}

impl SteppingClock {
    /// Start at the current instant
    pub fn new(step: Duration) -> Self {
        Self {
            origin: Instant::now(),
            step,
            ticks: AtomicU64::new(0),
        }
    }

    /// Number of readings so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Simulated time elapsed so far
    pub fn elapsed(&self) -> Duration {
        self.step.saturating_mul(self.ticks().min(u32::MAX as u64) as u32)
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Instant {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed);
        let offset = self.step.saturating_mul(tick.min(u32::MAX as u64) as u32);
        self.origin + offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stepping_clock_advances_per_read() {
        let clock = SteppingClock::new(Duration::from_millis(33));
        let a = clock.now();
        let b = clock.now();
        let c = clock.now();
        assert_eq!(b - a, Duration::from_millis(33));
        assert_eq!(c - a, Duration::from_millis(66));
        assert_eq!(clock.ticks(), 3);
        assert_eq!(clock.elapsed(), Duration::from_millis(99));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
