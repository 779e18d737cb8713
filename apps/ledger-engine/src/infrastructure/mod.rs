//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application layer:
//!
//! - `broker/`: REST broker client
//! - `persistence/`: in-memory ledger, idempotency, cache and instrument stores
//! - `config/`: dependency injection container

pub mod broker;
pub mod config;
pub mod persistence;
