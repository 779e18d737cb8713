//! Ports (Interfaces)
//!
//! Driven ports implemented by infrastructure adapters.

mod broker_client;
mod cache_store;
mod idempotency_store;
mod instrument_catalog;
mod ledger_store;

pub use broker_client::{
    BrokerClient, BrokerClientError, BrokerHolding, BrokerMargin, BrokerOrder, BrokerPosition,
    ModifyOrderParams, PlaceOrderParams, TriggerOrderParams,
};
pub use cache_store::{CacheStore, CacheStoreError};
pub use idempotency_store::{IdempotencyStore, PendingInsert};
pub use instrument_catalog::InstrumentCatalog;
pub use ledger_store::{LedgerStore, StoreError};
