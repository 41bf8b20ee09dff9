//! Deferred restart
//!
//! Settings without the LIVE flag only take effect after a restart. The
//! engine asks a [`RestartTrigger`] to schedule one; [`DeferredRestart`] is
//! the stock trigger that counts down on a [`TimeSource`] and is polled
//! from the main loop.

use crate::core::traits::TimeSource;
use crate::log_info;
use alloc::string::{String, ToString};

/// Something able to restart the device later
pub trait RestartTrigger {
    /// Restart after `delay_secs`; a later call replaces an earlier one
    fn schedule_restart(&mut self, reason: &str, delay_secs: u32);
}

impl<R: RestartTrigger + ?Sized> RestartTrigger for &mut R {
    fn schedule_restart(&mut self, reason: &str, delay_secs: u32) {
        (**self).schedule_restart(reason, delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pending {
    reason: String,
    deadline_us: u64,
}

/// Restart timer driven by a time source
///
/// # Example
///
/// ```
/// use pico_settings::core::settings::{DeferredRestart, RestartTrigger};
/// use pico_settings::core::traits::MockTime;
///
/// let time = MockTime::new();
/// let mut restart = DeferredRestart::new(time.clone());
///
/// restart.schedule_restart("count", 5);
/// assert_eq!(restart.poll(), None);
///
/// time.advance(5_000_000);
/// assert_eq!(restart.poll().as_deref(), Some("count"));
/// ```
pub struct DeferredRestart<T: TimeSource> {
    time: T,
    pending: Option<Pending>,
}

impl<T: TimeSource> DeferredRestart<T> {
    pub fn new(time: T) -> Self {
        Self {
            time,
            pending: None,
        }
    }

    /// A restart is scheduled
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Reason of the scheduled restart
    pub fn reason(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.reason.as_str())
    }

    /// Microseconds until the restart is due
    pub fn remaining_us(&self) -> Option<u64> {
        self.pending
            .as_ref()
            .map(|p| p.deadline_us.saturating_sub(self.time.now_us()))
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Returns the reason once the deadline has passed, disarming the timer.
    /// The caller performs the actual restart.
    pub fn poll(&mut self) -> Option<String> {
        let due = self
            .pending
            .as_ref()
            .is_some_and(|p| self.time.now_us() >= p.deadline_us);
        if !due {
            return None;
        }
        self.pending.take().map(|p| p.reason)
    }
}

impl<T: TimeSource> RestartTrigger for DeferredRestart<T> {
    fn schedule_restart(&mut self, reason: &str, delay_secs: u32) {
        log_info!("Restart in {}s ({})", delay_secs, reason);
        self.pending = Some(Pending {
            reason: reason.to_string(),
            deadline_us: self
                .time
                .now_us()
                .saturating_add(u64::from(delay_secs) * 1_000_000),
        });
    }
}
