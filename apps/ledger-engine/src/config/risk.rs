//! Pre-submission risk checks.

use serde::{Deserialize, Serialize};

/// Risk checks applied before an order reaches the broker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Refuse priced buys whose value exceeds available segment margin.
    #[serde(default)]
    pub enforce_margin_check: bool,
}
