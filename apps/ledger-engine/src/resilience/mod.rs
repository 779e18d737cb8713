//! Resilience patterns for broker calls.

mod retry;

pub use retry::{ExponentialBackoffCalculator, RetryPolicy, retry_broker_call};
