// src/dag/retry.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Strategy for spacing retries of one task.
pub trait BackoffStrategy: fmt::Debug + Send + Sync {
    /// Delay to wait after `attempt` (1-based) failed, given the policy's base
    /// delay.
    fn delay(&self, base: Duration, attempt: u32) -> Duration;
}

/// Same wait between every attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fixed;

impl BackoffStrategy for Fixed {
    fn delay(&self, base: Duration, _attempt: u32) -> Duration {
        base
    }
}

/// `base * multiplier^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exponential {
    pub multiplier: f64,
    pub max: Duration,
}

impl BackoffStrategy for Exponential {
    fn delay(&self, base: Duration, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let raw = base.as_secs_f64() * exp;
        let bounded = raw.min(self.max.as_secs_f64()).max(0.0);
        // Near Duration::MAX the f64 round trip can overshoot; fall back to the cap.
        Duration::try_from_secs_f64(bounded)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Per-task retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first. Never below 1.
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Arc<dyn BackoffStrategy>,
    /// Data quality failures are usually not transient, so they are terminal
    /// unless this is set.
    pub retry_quality_failures: bool,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: Arc::new(Fixed),
            retry_quality_failures: false,
        }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn with_backoff(mut self, backoff: impl BackoffStrategy + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn retry_quality_failures(mut self, retry: bool) -> Self {
        self.retry_quality_failures = retry;
        self
    }

    /// Wait before the attempt following `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.delay(self.delay, attempt)
    }
}

impl Default for RetryPolicy {
    /// Three attempts, five minutes apart.
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(5 * 60))
    }
}
