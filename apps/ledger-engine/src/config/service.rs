//! Process-level settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Service identity and shutdown behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, attached to startup logs.
    #[serde(default = "default_name")]
    pub name: String,
    /// Time allowed for background tasks to stop after Ctrl-C.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServiceConfig {
    /// Graceful shutdown timeout.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_name() -> String {
    "ledger-engine".to_string()
}

const fn default_shutdown_timeout() -> u64 {
    30
}
