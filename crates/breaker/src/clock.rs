//! Time source for the breaker
//!
//! The breaker only ever asks "what instant is it now?" when it opens the
//! circuit and when it decides whether the open timeout has elapsed. Both go
//! through [`Clock`], so production code runs on [`SystemClock`] while tests
//! drive a [`MockClock`] forward without sleeping.
//!
//! ```
//! use std::time::Duration;
//!
//! use breakwater_core::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic time source consulted by the breaker.
pub trait Clock: Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Real monotonic clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Manually driven clock for deterministic tests
///
/// Clones share the same elapsed offset, so a test can hand one clone to the
/// breaker and keep another to move time forward.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a mock clock anchored at the current instant.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a mock clock anchored at `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self { start, elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Move the clock forward by `millis` milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Set the total offset from the anchor instant.
    pub fn set_elapsed(&self, duration: Duration) {
        *self.elapsed.lock() = duration;
    }

    /// Total offset from the anchor instant.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first, "System clock should never go backwards");
    }

    #[test]
    fn test_mock_clock_starts_at_anchor() {
        let anchor = Instant::now();
        let clock = MockClock::starting_at(anchor);
        assert_eq!(clock.now(), anchor);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    /// Validates `MockClock::advance` and `advance_millis` accumulate.
    ///
    /// Assertions:
    /// - Confirms the clock reports 5s then 5.25s after the anchor.
    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::new();
        let start = clock.now();

        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));

        clock.advance_millis(250);
        assert_eq!(clock.now().duration_since(start), Duration::from_millis(5250));
    }

    #[test]
    fn test_mock_clock_set_elapsed_overrides_offset() {
        let clock = MockClock::new();
        clock.advance(Duration::from_secs(30));
        clock.set_elapsed(Duration::from_secs(10));
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    /// Clones share one offset, which is what lets tests drive a breaker's
    /// clock from outside.
    #[test]
    fn test_mock_clock_clones_share_time() {
        let clock1 = MockClock::new();
        let clock2 = clock1.clone();

        clock2.advance(Duration::from_secs(15));
        assert_eq!(clock1.elapsed(), Duration::from_secs(15));
        assert_eq!(clock1.now(), clock2.now());
    }

    #[test]
    fn test_arc_clock_delegates() {
        let clock = Arc::new(MockClock::new());
        let before = clock.now();
        clock.advance_millis(40);
        assert_eq!(Clock::now(&clock).duration_since(before), Duration::from_millis(40));
    }
}
