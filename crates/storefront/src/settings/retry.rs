//! Reload policy after a failed settings load.

use std::time::Duration;

/// How the delay grows between automatic reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every time.
    Fixed,
    /// Delay doubles after each failure, capped at `max`.
    Exponential { max: Duration },
}

/// When to reload after consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed loads after which automatic reloads stop.
    pub max_attempts: u32,
    /// Delay before the first automatic reload.
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// Three loads, three seconds apart.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(3000),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next automatic load after `failures` consecutive
    /// failed loads, or `None` once `max_attempts` loads have failed.
    #[must_use]
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures >= self.max_attempts {
            return None;
        }
        match self.backoff {
            Backoff::Fixed => Some(self.delay),
            Backoff::Exponential { max } => {
                let factor = 2_u32.saturating_pow(failures - 1);
                Some(self.delay.saturating_mul(factor).min(max))
            }
        }
    }
}
