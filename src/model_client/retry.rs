//! Retry policy for the Call-Model step
//!
//! Attempt 1 runs immediately. Before attempt `n >= 2` the workflow waits
//! `first_delay * backoff_coefficient^(n - 2)`, capped at `max_delay`.
//! Only errors for which [`ModelError::is_retryable`] holds are retried, and
//! never beyond `max_attempts` attempts in total.
//!
//! With the defaults (15 s, 5 attempts, ×2) the waits are 15 s, 30 s, 60 s and
//! 120 s.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ModelError;
use crate::config::defaults;

/// Bounded backoff schedule applied to Call-Model failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    first_delay_ms: u64,
    max_attempts: u32,
    backoff_coefficient: f64,
    max_delay_ms: u64,
}

/// Invalid retry policy parameters
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryPolicyError {
    #[error("max_attempts must be at least 1")]
    NoAttempts,
    #[error("backoff_coefficient must be finite and >= 1.0 (got {0})")]
    BadCoefficient(f64),
    #[error("max_delay ({max_ms} ms) must be >= first_delay ({first_ms} ms)")]
    CapBelowFirstDelay { first_ms: u64, max_ms: u64 },
}

/// What to do after a failed Call-Model attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { next_attempt: u32, delay: Duration },
    GiveUp(GiveUpReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    NonRetryable,
    Exhausted,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            first_delay_ms: defaults::RETRY_FIRST_DELAY_SECS * 1_000,
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            backoff_coefficient: defaults::RETRY_BACKOFF_COEFFICIENT,
            max_delay_ms: defaults::RETRY_MAX_DELAY_SECS * 1_000,
        }
    }
}

impl RetryPolicy {
    /// Policy with a constant `first_delay` between attempts.
    pub fn fixed(first_delay: Duration, max_attempts: u32) -> Result<Self, RetryPolicyError> {
        Self::with_backoff(first_delay, max_attempts, 1.0, first_delay)
    }

    pub fn with_backoff(
        first_delay: Duration,
        max_attempts: u32,
        backoff_coefficient: f64,
        max_delay: Duration,
    ) -> Result<Self, RetryPolicyError> {
        if max_attempts == 0 {
            return Err(RetryPolicyError::NoAttempts);
        }
        if !backoff_coefficient.is_finite() || backoff_coefficient < 1.0 {
            return Err(RetryPolicyError::BadCoefficient(backoff_coefficient));
        }
        let first_ms = duration_ms(first_delay);
        let max_ms = duration_ms(max_delay);
        if max_ms < first_ms {
            return Err(RetryPolicyError::CapBelowFirstDelay { first_ms, max_ms });
        }
        Ok(Self {
            first_delay_ms: first_ms,
            max_attempts,
            backoff_coefficient,
            max_delay_ms: max_ms,
        })
    }

    pub fn first_delay(&self) -> Duration {
        Duration::from_millis(self.first_delay_ms)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff_coefficient(&self) -> f64 {
        self.backoff_coefficient
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Wait required before `attempt` (1-based). Zero for the first attempt.
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let scaled = self.first_delay_ms as f64 * self.backoff_coefficient.powi(exponent);
        // f64::min also absorbs an infinite product
        let capped = scaled.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Decide whether attempt number `attempt` (which just failed with
    /// `error`) is followed by another one.
    pub fn decide(&self, error: &ModelError, attempt: u32) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp(GiveUpReason::NonRetryable);
        }
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp(GiveUpReason::Exhausted);
        }
        let next_attempt = attempt + 1;
        RetryDecision::Retry {
            next_attempt,
            delay: self.delay_before_attempt(next_attempt),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
