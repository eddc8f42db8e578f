//! Reconnection backoff policy
//!
//! Attempt N (N >= 1) waits `min(N * base, max)`: linear growth, capped.

use std::time::Duration;

/// Delay before attempt number `attempt` (1-based).
pub fn delay_for(attempt: u32, base: Duration, max: Duration) -> Duration {
    base.checked_mul(attempt).map_or(max, |delay| delay.min(max))
}

/// Attempt counter with a give-up threshold.
///
/// One `Backoff` drives one reconnection cycle: the counter climbs with each
/// failed attempt and is reset when an attempt succeeds.
#[derive(Debug)]
pub struct Backoff {
    attempts: u32,
    max_attempts: u32,
    base: Duration,
    max: Duration,
}

impl Backoff {
    /// Create a policy for one reconnection cycle
    pub fn new(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            base,
            max,
        }
    }

    /// Attempts recorded so far in this cycle
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record the next attempt and return the delay to wait before it, or
    /// `None` once the attempt budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts > self.max_attempts {
            return None;
        }
        Some(delay_for(self.attempts, self.base, self.max))
    }

    /// Reset after a successful connection; returns the attempt count that
    /// succeeded.
    pub fn reset(&mut self) -> u32 {
        std::mem::take(&mut self.attempts)
    }
}
