//! Exponential backoff for reconnect / retry loops.

use std::time::Duration;

use rand::Rng;

/// Escalating delay with an upper cap and optional jitter.
///
/// `next_delay` returns the current delay and escalates for the next call;
/// `reset` returns to the initial delay (called after a sustained healthy
/// period, not after the first success, so flapping connections keep their
/// penalty).
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    factor: f64,
    max: Duration,
    jitter: bool,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, factor: f64, max: Duration) -> Self {
        Self {
            initial,
            factor,
            max,
            jitter: false,
            current: initial,
        }
    }

    /// Adds up to 25% random jitter on top of each delay so that many
    /// clients reconnecting after the same outage do not stampede.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// The YouTube API retry profile used across the crate.
    pub fn for_polling() -> Self {
        Self::new(Duration::from_secs(2), 1.5, Duration::from_secs(60))
    }

    /// The persistent-connection reconnect profile.
    pub fn for_reconnect() -> Self {
        Self::new(Duration::from_secs(1), 2.0, Duration::from_secs(60)).with_jitter()
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        let escalated = self.current.mul_f64(self.factor);
        self.current = escalated.min(self.max);

        if self.jitter {
            let extra = base.mul_f64(rand::thread_rng().gen_range(0.0..0.25));
            base + extra
        } else {
            base
        }
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Delay that would be returned by the next `next_delay` call.
    pub fn peek(&self) -> Duration {
        self.current
    }
}
