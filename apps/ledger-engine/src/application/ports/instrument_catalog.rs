//! Instrument Catalog Port (Driven Port)

use async_trait::async_trait;

use crate::domain::order::Exchange;

/// Lookup of tradable instruments.
#[async_trait]
pub trait InstrumentCatalog: Send + Sync {
    /// Whether `symbol` is tradable on `exchange`.
    async fn is_known(&self, exchange: Exchange, symbol: &str) -> bool;
}
