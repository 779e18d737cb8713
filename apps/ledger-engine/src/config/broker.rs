//! Broker connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Broker API endpoint and session credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key.
    #[serde(default)]
    pub api_key: String,
    /// Session access token.
    #[serde(default)]
    pub access_token: String,
    /// Account the ledger tracks.
    #[serde(default)]
    pub account_id: String,
    /// Per-call deadline in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            access_token: String::new(),
            account_id: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl BrokerConfig {
    /// Per-call deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Whether both credentials are present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.access_token.is_empty()
    }
}

fn default_base_url() -> String {
    "https://api.kite.trade".to_string()
}

const fn default_request_timeout_ms() -> u64 {
    7000
}
