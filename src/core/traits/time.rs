//! Time abstraction traits for platform-agnostic timing operations.
//!
//! The deferred restart timer reads time through `TimeSource` so it can be
//! driven by the board clock on target and by `MockTime` on the host.

use alloc::rc::Rc;
use core::cell::Cell;

/// Platform-agnostic monotonic time source.
///
/// # Example
///
/// ```
/// use pico_settings::core::traits::{MockTime, TimeSource};
///
/// let time = MockTime::new();
/// let started = time.now_us();
/// time.advance(20_000);
/// assert_eq!(time.elapsed_since(started), 20_000);
/// ```
pub trait TimeSource {
    /// Returns current time in milliseconds since system start.
    fn now_ms(&self) -> u64;

    /// Returns current time in microseconds since system start.
    fn now_us(&self) -> u64;

    /// Returns elapsed time in microseconds since a reference point.
    ///
    /// Uses saturating subtraction to handle potential overflow.
    fn elapsed_since(&self, reference_us: u64) -> u64 {
        self.now_us().saturating_sub(reference_us)
    }
}

/// Mock time source with controllable time advancement.
///
/// Clones share the same clock, so a test can keep one handle and advance
/// the time seen by a timer holding another.
#[derive(Clone, Default)]
pub struct MockTime {
    current_us: Rc<Cell<u64>>,
}

impl MockTime {
    /// Creates a new `MockTime` starting at time 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `MockTime` starting at the specified time.
    pub fn with_initial(us: u64) -> Self {
        Self {
            current_us: Rc::new(Cell::new(us)),
        }
    }

    /// Sets the current time to an absolute value.
    pub fn set(&self, us: u64) {
        self.current_us.set(us);
    }

    /// Advances the current time by the specified amount.
    pub fn advance(&self, us: u64) {
        self.current_us.set(self.current_us.get() + us);
    }
}

impl TimeSource for MockTime {
    fn now_ms(&self) -> u64 {
        self.current_us.get() / 1000
    }

    fn now_us(&self) -> u64 {
        self.current_us.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_time_with_initial() {
        let time = MockTime::with_initial(5_000_000);
        assert_eq!(time.now_us(), 5_000_000);
        assert_eq!(time.now_ms(), 5000);
    }

    #[test]
    fn mock_time_clones_share_clock() {
        let time = MockTime::new();
        let other = time.clone();

        time.advance(1_500);
        assert_eq!(other.now_us(), 1_500);
        assert_eq!(other.now_ms(), 1);
    }

    #[test]
    fn mock_time_elapsed_since_saturates() {
        let time = MockTime::new();
        time.set(1_000);

        assert_eq!(time.elapsed_since(300), 700);
        assert_eq!(time.elapsed_since(5_000), 0);
    }
}
