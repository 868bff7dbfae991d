//! Fixed-period tick scheduling
//!
//! Deadlines advance by exactly one interval per tick, so the cadence does
//! not drift with the time spent processing a tick. Sleeps are split into
//! short slices so a stop request is noticed well within a second even
//! when the interval is tens of seconds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::ConfigError;

/// Longest single sleep while waiting for a deadline
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Convert a tick interval in seconds, rejecting values a run cannot use
///
/// Zero, negative, non-finite and values too large for a [`Duration`] are
/// all [`ConfigError::InvalidInterval`].
pub fn tick_interval(interval_s: f64) -> Result<Duration, ConfigError> {
    if !interval_s.is_finite() || interval_s <= 0.0 {
        return Err(ConfigError::InvalidInterval(interval_s));
    }
    match Duration::try_from_secs_f64(interval_s) {
        Ok(interval) if !interval.is_zero() => Ok(interval),
        _ => Err(ConfigError::InvalidInterval(interval_s)),
    }
}

/// Monotonic time source
pub trait Clock {
    /// Time since an arbitrary fixed epoch
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Clock backed by [`std::time::Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Create a clock whose epoch is now
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Cooperative stop request, settable from any thread
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create a cleared flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop after the current tick
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if a stop has been requested
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives a fixed-period control loop
#[derive(Debug)]
pub struct TickScheduler<C> {
    clock: C,
    interval: Duration,
    next_deadline: Duration,
}

impl<C: Clock> TickScheduler<C> {
    /// Create a scheduler ticking every `interval_s` seconds
    pub fn new(interval_s: f64, clock: C) -> Result<Self, ConfigError> {
        let interval = tick_interval(interval_s)?;

        Ok(Self {
            clock,
            interval,
            next_deadline: Duration::ZERO,
        })
    }

    /// Tick interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Clock the scheduler runs on
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Current clock reading
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Deadline of the next tick
    pub fn next_deadline(&self) -> Duration {
        self.next_deadline
    }

    /// Arm the scheduler and return the start time
    ///
    /// The first deadline is one interval after the returned time.
    pub fn start(&mut self) -> Duration {
        let now = self.clock.now();
        self.next_deadline = now.saturating_add(self.interval);
        now
    }

    /// Block until the next deadline
    ///
    /// Returns `true` on overrun: the deadline had already passed on entry
    /// and no sleep happened. Returns early, without error, once `stop` is
    /// requested. The deadline always advances by one interval.
    pub fn wait_for_next_tick(&mut self, stop: &StopFlag) -> bool {
        let deadline = self.next_deadline;
        self.next_deadline = deadline.saturating_add(self.interval);

        let mut now = self.clock.now();
        if now > deadline {
            debug!(
                late_ms = (now - deadline).as_millis() as u64,
                "tick overrun"
            );
            return true;
        }

        while now < deadline {
            if stop.is_requested() {
                break;
            }
            let remaining = deadline - now;
            self.clock.sleep(remaining.min(POLL_INTERVAL));
            now = self.clock.now();
        }

        false
    }
}
