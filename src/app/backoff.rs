//! Exponential backoff.
//!
//! `delay = base * 2^min(attempt, max_attempts)`. The exponent saturates at
//! the cap, the counter never exceeds it. [`AgentConfig::validate`] ensures
//! `base << max_attempts` fits in a `u32`, so the multiplication here can't
//! overflow for a validated config; it saturates regardless.
//!
//! [`AgentConfig::validate`]: crate::config::AgentConfig::validate

/// Pure backoff step.
///
/// Returns the delay for `current_attempt` and the attempt number to use
/// next time: `current_attempt + 1`, or unchanged once at the cap.
pub fn step(base_ms: u32, max_attempts: u32, current_attempt: u32) -> (u32, u32) {
    let exponent = current_attempt.min(max_attempts);
    let delay = base_ms.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX));
    let next = if current_attempt >= max_attempts {
        max_attempts
    } else {
        current_attempt + 1
    };
    (delay, next)
}

/// Delay for `attempt` without the counter bookkeeping.
pub fn delay_ms(base_ms: u32, max_attempts: u32, attempt: u32) -> u32 {
    step(base_ms, max_attempts, attempt).0
}

/// Retry counter for one phase of the loop (signup or polling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    base_ms: u32,
    max_attempts: u32,
}

impl RetryState {
    pub fn new(base_ms: u32, max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            base_ms,
            max_attempts,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Count a recoverable failure and return how long to wait before the
    /// next try. The first failure waits `base * 2`.
    pub fn record_failure(&mut self) -> u32 {
        let (_, next) = step(self.base_ms, self.max_attempts, self.attempt);
        self.attempt = next;
        delay_ms(self.base_ms, self.max_attempts, self.attempt)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
