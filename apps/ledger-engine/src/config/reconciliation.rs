//! Reconciliation configuration for periodic broker state sync.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Periodic reconciliation and maintenance schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Enable periodic reconciliation.
    #[serde(default = "default_reconciliation_enabled")]
    pub enabled: bool,
    /// Reconciliation interval in seconds.
    #[serde(default = "default_reconciliation_interval")]
    pub interval_secs: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: default_reconciliation_enabled(),
            interval_secs: default_reconciliation_interval(),
        }
    }
}

impl ReconciliationConfig {
    /// Interval between runs.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

const fn default_reconciliation_enabled() -> bool {
    true
}

const fn default_reconciliation_interval() -> u64 {
    300 // 5 minutes
}
