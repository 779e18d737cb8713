//! Caller-side retry with exponential backoff for broker calls.
//!
//! The broker gateway never retries. Callers that want retries wrap the
//! gateway call in [`retry_broker_call`], which only retries recoverable
//! failures (timeouts and connection failures).
//!
//! # Example
//!
//! ```rust,ignore
//! use ledger_engine::resilience::{RetryPolicy, ExponentialBackoffCalculator};
//!
//! let policy = RetryPolicy::default();
//! let mut backoff = ExponentialBackoffCalculator::new(&policy);
//!
//! let delay1 = backoff.next_backoff(); // ~200ms with jitter
//! let delay2 = backoff.next_backoff(); // ~400ms with jitter
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::application::services::GatewayError;

/// Retry policy for broker calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (default: 3).
    pub max_attempts: u32,
    /// Initial backoff duration (default: 200ms).
    pub initial_backoff: Duration,
    /// Maximum backoff duration (default: 5s).
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth (default: 2.0).
    pub backoff_multiplier: f64,
    /// Jitter factor for randomization (default: 0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Fixed, jitter-free delays. Mostly useful in tests.
    #[must_use]
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff: delay,
            max_backoff: delay,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

/// Calculator for exponential backoff with jitter.
#[derive(Debug)]
pub struct ExponentialBackoffCalculator {
    current_attempt: u32,
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoffCalculator {
    /// Create a new backoff calculator from a retry policy.
    #[must_use]
    pub const fn new(policy: &RetryPolicy) -> Self {
        Self {
            current_attempt: 0,
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Get the next backoff duration with jitter.
    ///
    /// Returns `None` if max attempts exceeded.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }

        let base_backoff_ms = self.calculate_base_backoff_ms();
        let jittered_ms = self.apply_jitter(base_backoff_ms);
        let capped_ms = jittered_ms.min(self.max_backoff_ms);

        self.current_attempt += 1;

        Some(Duration::from_millis(capped_ms))
    }

    fn calculate_base_backoff_ms(&self) -> u64 {
        let multiplier = self.backoff_multiplier.powi(self.current_attempt as i32);
        let backoff = (self.initial_backoff_ms as f64 * multiplier) as u64;
        backoff.min(self.max_backoff_ms)
    }

    /// Random value in [backoff * (1 - jitter), backoff * (1 + jitter)].
    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        if self.jitter_factor <= 0.0 || backoff_ms == 0 {
            return backoff_ms;
        }
        let mut rng = rand::rng();
        let jitter_range = backoff_ms as f64 * self.jitter_factor;
        let min = (backoff_ms as f64 - jitter_range).max(0.0);
        let max = backoff_ms as f64 + jitter_range;

        rng.random_range(min..=max) as u64
    }

    /// Retries handed out so far.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Check if more retries are available.
    #[must_use]
    pub const fn has_remaining_attempts(&self) -> bool {
        self.current_attempt < self.max_attempts
    }
}

/// Run `call`, retrying recoverable gateway failures per `policy`.
///
/// Fatal failures and the last recoverable failure are returned unchanged.
pub async fn retry_broker_call<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut backoff = ExponentialBackoffCalculator::new(policy);
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                let Some(delay) = backoff.next_backoff() else {
                    return Err(err);
                };
                warn!(
                    operation,
                    kind = err.kind(),
                    attempt = backoff.current_attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "Recoverable broker failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
