//! Persistence adapters.
//!
//! In-memory implementations of the storage ports. They honour the same
//! atomicity contracts a database-backed adapter must provide.

mod cache;
mod idempotency;
mod in_memory;
mod instruments;

pub use cache::InMemoryCacheStore;
pub use idempotency::InMemoryIdempotencyStore;
pub use in_memory::InMemoryLedgerStore;
pub use instruments::InMemoryInstrumentCatalog;
