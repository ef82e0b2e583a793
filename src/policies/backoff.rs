//! # Jittered exponential backoff between respawns.
//!
//! [`Backoff`] is a stateful delay generator:
//!
//! - `next()` advances the pre-jitter delay (`min`, then `× factor` capped
//!   at `max` when `max > 0`) and returns it scaled by a uniform jitter in
//!   `[1 - jitter, 1 + jitter]`, clamped to zero.
//! - `reset()` returns the generator to its initial state; the supervisor
//!   calls it after a clean child exit so a healthy tunnel always restarts
//!   at `min`.
//! - `force_max()` jumps straight to the cap, for adversarial conditions.
//!
//! The RNG is owned by the generator and seeded from the wall clock at
//! construction. The type is not internally synchronized; the supervisor
//! serializes access.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RestartConfig;

/// Stateful jittered exponential delay generator.
#[derive(Debug)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
    cur: Duration,
    rng: StdRng,
}

impl Backoff {
    pub fn new(cfg: &RestartConfig) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self {
            min: Duration::from_millis(cfg.min_delay_ms),
            max: Duration::from_millis(cfg.max_delay_ms),
            factor: cfg.factor,
            jitter: cfg.jitter,
            cur: Duration::ZERO,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Advances the generator and returns the next jittered delay.
    ///
    /// A `min` of zero disables backoff entirely: the returned delay is
    /// always zero and no state advances.
    pub fn next(&mut self) -> Duration {
        if self.min.is_zero() {
            return Duration::ZERO;
        }
        if self.cur.is_zero() {
            self.cur = self.min;
        } else {
            let grown = self.cur.as_secs_f64() * self.factor;
            let mut next = Duration::try_from_secs_f64(grown).unwrap_or(Duration::MAX);
            if !self.max.is_zero() && next > self.max {
                next = self.max;
            }
            self.cur = next;
        }
        self.jittered(self.cur)
    }

    /// Returns the generator to its initial state.
    pub fn reset(&mut self) {
        self.cur = Duration::ZERO;
    }

    /// Jumps the pre-jitter delay to the cap (`min` when no cap is set).
    pub fn force_max(&mut self) {
        self.cur = if self.max.is_zero() { self.min } else { self.max };
    }

    /// Current pre-jitter delay without advancing; used for status output.
    pub fn current(&self) -> Duration {
        self.cur
    }

    fn jittered(&mut self, d: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return d;
        }
        // Uniform in [-jitter, +jitter].
        let delta = self.jitter * (self.rng.random::<f64>() * 2.0 - 1.0);
        let scale = 1.0 + delta;
        if scale <= 0.0 {
            return Duration::ZERO;
        }
        d.mul_f64(scale)
    }
}
