//! Capped exponential backoff for the accept loop.

use std::time::Duration;

/// Calculate the delay before retry number `attempt` (1-based).
///
/// The delay is `base_ms * 2^(attempt - 1)`, capped at `max_ms`. Attempt 0
/// means no failure yet and yields no delay.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    Duration::from_millis(delay_ms.min(max_ms))
}

/// Tracks consecutive transient accept failures.
#[derive(Debug, Clone)]
pub struct AcceptBackoff {
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
}

impl AcceptBackoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            attempt: 0,
            base_ms,
            max_ms,
        }
    }

    /// Record one more consecutive failure and return how long to wait.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        calculate_backoff(self.attempt, self.base_ms, self.max_ms)
    }

    /// Forget previous failures after a successful accept.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of consecutive failures recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
