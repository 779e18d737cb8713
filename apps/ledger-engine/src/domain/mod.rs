//! Domain Layer
//!
//! Core ledger rules with no knowledge of storage, brokers or transport.
//!
//! - `order`: order aggregate, status lifecycle, state machine
//! - `audit`: append-only state history records
//! - `idempotency`: idempotency records and payload fingerprints
//! - `market`: positions, margins, market hours
//! - `shared`: strongly-typed identifiers

pub mod audit;
pub mod idempotency;
pub mod market;
pub mod order;
pub mod shared;
