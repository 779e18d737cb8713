//! Application Services
//!
//! The ledger's components, from the leaf guards up to the service facade
//! and its background scheduler.

mod adaptive_cache;
mod audit_trail;
mod broker_gateway;
mod idempotency_guard;
mod in_flight;
mod ledger_service;
mod order_ledger;
mod reconciliation;
mod scheduler;

pub use adaptive_cache::{
    ActivityPolicy, AdaptiveCache, CacheRead, CacheTtls, ReadSource, margins_key, positions_key,
};
pub use audit_trail::AuditTrail;
pub use broker_gateway::{BrokerGateway, GatewayError};
pub use idempotency_guard::{
    ConflictError, DEFAULT_RETENTION, IdempotencyError, IdempotencyGuard,
};
pub use in_flight::{InFlightGuard, InFlightOrders};
pub use ledger_service::{LedgerService, LedgerServiceConfig};
pub use order_ledger::OrderLedger;
pub use reconciliation::{
    LatestReports, OrderDrift, OrderReconciliationReport, PositionDrift,
    PositionReconciliationReport, ReconciliationEngine, ReconciliationError,
    ReconciliationSummary,
};
pub use scheduler::spawn_maintenance;
