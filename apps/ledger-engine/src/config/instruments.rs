//! Tradable instruments seeded into the instrument catalog.

use serde::{Deserialize, Serialize};

use crate::domain::order::Exchange;

/// One tradable instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Exchange.
    pub exchange: Exchange,
    /// Trading symbol.
    pub symbol: String,
}
