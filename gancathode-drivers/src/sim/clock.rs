//! Manually advanced clock

use std::sync::{Arc, Mutex};
use std::time::Duration;

use gancathode_core::scheduler::Clock;

use super::lock;

/// Clock whose `sleep` advances virtual time instantly
///
/// Clones share the same time, so a test can hold one copy while the run
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Arc<Mutex<Duration>>,
}

impl SimClock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without sleeping
    pub fn advance(&self, d: Duration) {
        *lock(&self.now) += d;
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        *lock(&self.now)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
