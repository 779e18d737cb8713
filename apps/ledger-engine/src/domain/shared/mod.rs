//! Shared kernel: identifiers used across the ledger's bounded contexts.

mod identifiers;

pub use identifiers::{AccountId, BrokerOrderId, IdempotencyKey, OrderId, TriggerId, UserId};
