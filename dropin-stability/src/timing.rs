//! Grace periods and attempt budgets.

use std::thread;
use std::time::Duration;

use dropin_core::config::StabilityConfig;

/// How long a checker may wait for its condition.
///
/// A checker observes, and while the condition does not hold it sleeps one
/// grace period (scaled by `time_factor`) and observes again, at most
/// `attempts` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityTiming {
    pub grace: Duration,
    pub attempts: u32,
    pub time_factor: u32,
}

impl Default for StabilityTiming {
    fn default() -> Self {
        Self::from_config(&StabilityConfig::default())
    }
}

impl StabilityTiming {
    pub fn from_config(config: &StabilityConfig) -> Self {
        Self {
            grace: Duration::from_millis(config.grace_ms),
            attempts: config.attempts,
            time_factor: config.time_factor.max(1),
        }
    }

    /// Short probe: 3 ms grace, 3 attempts, same time factor.
    pub fn quick(&self) -> Self {
        Self {
            grace: Duration::from_millis(3),
            attempts: 3,
            time_factor: self.time_factor,
        }
    }

    /// The grace period dilated by the time factor.
    pub fn grace_period(&self) -> Duration {
        self.grace * self.time_factor
    }

    pub fn sleep(&self) {
        thread::sleep(self.grace_period());
    }

    /// Observe until `condition` holds or the attempt budget is spent.
    ///
    /// Returns the number of grace periods slept on success, `None` when the
    /// condition never held.
    pub fn wait_until(&self, mut condition: impl FnMut() -> bool) -> Option<u32> {
        let mut retries = 0;
        loop {
            if condition() {
                return Some(retries);
            }
            if retries == self.attempts {
                return None;
            }
            self.sleep();
            retries += 1;
        }
    }
}
