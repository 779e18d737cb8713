//! Reconciliation reports.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::PositionKey;
use crate::domain::order::OrderStatus;
use crate::domain::shared::{AccountId, BrokerOrderId, OrderId};

/// An order known on both sides whose details disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDrift {
    /// Ledger order id.
    pub order_id: OrderId,
    /// Broker order id.
    pub broker_order_id: BrokerOrderId,
    /// Local status.
    pub local_status: OrderStatus,
    /// Raw broker status.
    pub broker_status: String,
    /// Local quantity.
    pub local_quantity: Decimal,
    /// Broker quantity.
    pub broker_quantity: Decimal,
    /// Human-readable differences.
    pub differences: Vec<String>,
}

/// Outcome of comparing local orders against the broker's order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReconciliationReport {
    /// Account reconciled.
    pub account_id: AccountId,
    /// Orders present on both sides and compared.
    pub orders_compared: usize,
    /// Compared orders that agree.
    pub reconciled: usize,
    /// Active local orders the broker does not report.
    pub missing_at_broker: Vec<OrderId>,
    /// Broker orders unknown locally.
    pub missing_locally: Vec<BrokerOrderId>,
    /// Orders whose status or quantity disagree.
    pub drifted: Vec<OrderDrift>,
    /// Orders skipped because the ledger was mutating them.
    pub skipped_in_flight: Vec<OrderId>,
    /// No discrepancy found.
    pub passed: bool,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration_ms: u64,
}

/// A position held on both sides with different quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDrift {
    /// Position identity.
    pub key: PositionKey,
    /// Local net quantity.
    pub local_quantity: Decimal,
    /// Broker net quantity.
    pub broker_quantity: Decimal,
}

/// Outcome of comparing the local position book against broker positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionReconciliationReport {
    /// Account reconciled.
    pub account_id: AccountId,
    /// Positions present on both sides and compared.
    pub positions_compared: usize,
    /// Compared positions that agree.
    pub reconciled: usize,
    /// Open local positions the broker does not report.
    pub missing_at_broker: Vec<PositionKey>,
    /// Broker positions unknown locally.
    pub missing_locally: Vec<PositionKey>,
    /// Positions whose quantity disagrees.
    pub drifted: Vec<PositionDrift>,
    /// No discrepancy found.
    pub passed: bool,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration_ms: u64,
}

/// Both reports of a full run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    /// Order report.
    pub orders: OrderReconciliationReport,
    /// Position report.
    pub positions: PositionReconciliationReport,
}

impl ReconciliationSummary {
    /// Whether both reports passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.orders.passed && self.positions.passed
    }
}

/// Most recent report of each kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestReports {
    /// Last order report.
    pub orders: Option<OrderReconciliationReport>,
    /// Last position report.
    pub positions: Option<PositionReconciliationReport>,
}
