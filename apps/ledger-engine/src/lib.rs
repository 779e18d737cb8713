// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::default_trait_access
    )
)]

//! Ledger Engine - Rust Core Library
//!
//! Keeps a local ledger of orders, positions and margins consistent with an
//! external broker that remains the source of truth.
//!
//! # Architecture (Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: order aggregate and lifecycle, audit records, idempotency
//!   records, positions and margins
//!
//! - **Application**: ports and services
//!   - `ports`: `LedgerStore`, `IdempotencyStore`, `CacheStore`,
//!     `BrokerClient`, `InstrumentCatalog`
//!   - `services`: `IdempotencyGuard`, `OrderLedger`, `AuditTrail`,
//!     `BrokerGateway`, `ReconciliationEngine`, `AdaptiveCache`, and the
//!     `LedgerService` facade
//!   - `dto`: responses and broker postbacks
//!
//! - **Infrastructure**: adapters
//!   - `broker`: REST broker client
//!   - `persistence`: in-memory stores
//!   - `config`: dependency injection container

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Layers
// =============================================================================

/// Domain layer - Core ledger rules with no external dependencies.
pub mod domain;

/// Application layer - Ports and services.
pub mod application;

/// Infrastructure layer - Adapters and dependency injection.
pub mod infrastructure;

// =============================================================================
// Cross-cutting
// =============================================================================

/// YAML configuration.
pub mod config;

/// Crate-level error and its HTTP mapping.
pub mod error;

/// Metric recording helpers.
pub mod observability;

/// Caller-side retry of broker calls.
pub mod resilience;

/// Tracing subscriber setup.
pub mod telemetry;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use application::dto::{BrokerOrderUpdate, IdempotentResponse, OrderResponse};
pub use application::services::{LedgerService, LedgerServiceConfig};
pub use config::{LedgerConfig, load_config, load_config_or_default};
pub use domain::order::{Order, OrderRequest, OrderStatus};
pub use error::{ErrorCode, LedgerError};
pub use infrastructure::config::{Container, LiveLedgerService};
