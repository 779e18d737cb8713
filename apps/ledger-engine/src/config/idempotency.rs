//! Idempotency record lifetimes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long idempotency records live.
///
/// One window covers both states: a pending claim expires after it just
/// like a completed record, and completing a request restarts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// Record lifetime in seconds.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention(),
        }
    }
}

impl IdempotencyConfig {
    /// Record lifetime.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

const fn default_retention() -> u64 {
    3600
}
