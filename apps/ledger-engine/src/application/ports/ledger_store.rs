//! Ledger Store Port (Driven Port)
//!
//! Persistence for orders, their state history and the local position book.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::audit::{OrderStateHistory, StateChange};
use crate::domain::market::Position;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::shared::{AccountId, BrokerOrderId, IdempotencyKey, OrderId};

/// Storage failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store could not serve the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The order's stored status differs from the one the caller transitioned from.
    #[error("Order {order_id} changed concurrently: expected {expected}, found {actual}")]
    StatusConflict {
        /// Order ID.
        order_id: OrderId,
        /// Status the caller read.
        expected: OrderStatus,
        /// Status currently stored.
        actual: OrderStatus,
    },

    /// Referenced order does not exist.
    #[error("Order not found in store: {0}")]
    OrderNotFound(OrderId),

    /// An order with this id already exists.
    #[error("Duplicate order id: {0}")]
    DuplicateOrder(OrderId),

    /// No live idempotency record matches the key and fingerprint.
    #[error("No live idempotency record for key '{0}'")]
    RecordNotFound(IdempotencyKey),
}

/// Ledger persistence.
///
/// Implementations must apply an order write and its history row as one
/// unit: either both become visible or neither does.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a new order together with its creation record.
    async fn insert_order(
        &self,
        order: &Order,
        creation: StateChange,
    ) -> Result<OrderStateHistory, StoreError>;

    /// Replace the stored order if its status still equals `expected_from`,
    /// appending `change` in the same step.
    async fn commit_transition(
        &self,
        order: &Order,
        expected_from: OrderStatus,
        change: StateChange,
    ) -> Result<OrderStateHistory, StoreError>;

    /// Append a history row without touching the order.
    async fn append_history(&self, change: StateChange) -> Result<OrderStateHistory, StoreError>;

    /// Load an order.
    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError>;

    /// Find the order the broker knows under `broker_order_id`.
    async fn find_by_broker_id(
        &self,
        broker_order_id: &BrokerOrderId,
    ) -> Result<Option<Order>, StoreError>;

    /// All orders of an account.
    async fn orders_for_account(&self, account_id: &AccountId) -> Result<Vec<Order>, StoreError>;

    /// History of one order, oldest first.
    async fn history(&self, order_id: &OrderId) -> Result<Vec<OrderStateHistory>, StoreError>;

    /// Local position book of an account.
    async fn positions(&self, account_id: &AccountId) -> Result<Vec<Position>, StoreError>;

    /// Insert or replace a position.
    async fn upsert_position(&self, position: &Position) -> Result<(), StoreError>;
}
