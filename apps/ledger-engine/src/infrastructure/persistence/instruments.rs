//! In-memory instrument catalog.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::application::ports::InstrumentCatalog;
use crate::domain::order::Exchange;

/// Fixed set of tradable `(exchange, symbol)` pairs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryInstrumentCatalog {
    instruments: HashSet<(Exchange, String)>,
}

impl InMemoryInstrumentCatalog {
    /// Build a catalog from `(exchange, symbol)` pairs.
    pub fn new<I, S>(instruments: I) -> Self
    where
        I: IntoIterator<Item = (Exchange, S)>,
        S: AsRef<str>,
    {
        Self {
            instruments: instruments
                .into_iter()
                .map(|(exchange, symbol)| (exchange, symbol.as_ref().trim().to_ascii_uppercase()))
                .collect(),
        }
    }

    /// Number of instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

#[async_trait]
impl InstrumentCatalog for InMemoryInstrumentCatalog {
    async fn is_known(&self, exchange: Exchange, symbol: &str) -> bool {
        self.instruments
            .contains(&(exchange, symbol.trim().to_ascii_uppercase()))
    }
}
