//! # Provisioning Backoff
//!
//! Deadline-bounded polling with jittered exponential growth.
//!
//! Each tick yields the remaining budget. Between ticks the timer sleeps for
//! `min(interval * 2 * jitter, 15s, remaining)`, and that value becomes the
//! next interval, so the sleeps compound until they hit the cap. Jitter is
//! drawn from a Gaussian centered at 0.8 so concurrent reconciliations drift
//! apart instead of polling in lockstep.
//!
//! Time comes from a [`Clock`] so tests can run the loop on virtual time.

use rand_distr::{Distribution, Normal};
use std::fmt::Debug;
use std::time::{Duration, Instant};

/// Upper bound of a single sleep between polls
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Starting interval for most status polls
pub const FAST_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Starting interval for listener creation and default-rule removal
pub const SLOW_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Source of time for polling loops
#[async_trait::async_trait]
pub trait Clock: Debug + Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Suspend the calling task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time and tokio timers
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Multiplier applied to each interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// Normally distributed factor, clamped at zero
    Gaussian {
        mean: f64,
        std_dev: f64,
    },
    /// Constant factor
    Fixed(f64),
}

impl Default for Jitter {
    fn default() -> Self {
        Jitter::Gaussian {
            mean: 0.8,
            std_dev: 0.05,
        }
    }
}

impl Jitter {
    /// Draw one factor
    pub fn sample(&self) -> f64 {
        match *self {
            Jitter::Gaussian { mean, std_dev } => Normal::new(mean, std_dev)
                .map(|normal| normal.sample(&mut rand::rng()))
                .unwrap_or(mean)
                .max(0.0),
            Jitter::Fixed(factor) => factor,
        }
    }
}

/// Explicit state of one polling loop
#[derive(Debug)]
pub struct ProvisioningTimer<'a> {
    clock: &'a dyn Clock,
    jitter: Jitter,
    deadline: Instant,
    interval: Duration,
    started: bool,
}

impl<'a> ProvisioningTimer<'a> {
    /// Start a loop that ends `timeout` from now
    pub fn new(clock: &'a dyn Clock, jitter: Jitter, timeout: Duration, interval: Duration) -> Self {
        Self {
            clock,
            jitter,
            deadline: clock.now() + timeout,
            interval,
            started: false,
        }
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(self.clock.now())
    }

    /// Interval the next sleep grows from
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next attempt.
    ///
    /// The first call returns immediately. Returns the remaining budget, or
    /// `None` once the deadline has passed.
    pub async fn tick(&mut self) -> Option<Duration> {
        if self.started {
            let remaining = self.remaining();
            if remaining.is_zero() {
                return None;
            }
            let grown = Duration::try_from_secs_f64(self.interval.as_secs_f64() * 2.0 * self.jitter.sample())
                .unwrap_or(MAX_POLL_INTERVAL);
            self.interval = grown.min(MAX_POLL_INTERVAL).min(remaining);
            if !self.interval.is_zero() {
                self.clock.sleep(self.interval).await;
            }
        }
        self.started = true;

        let remaining = self.remaining();
        (!remaining.is_zero()).then_some(remaining)
    }
}
