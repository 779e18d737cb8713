//! Order aggregate root.
//!
//! Status changes go through [`OrderStateMachine`]. The broker order id can
//! only be attached by [`Order::mark_submitted`], which the ledger calls with
//! the id taken from a broker response.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::OrderError;
use super::request::OrderRequest;
use super::state_machine::OrderStateMachine;
use super::status::OrderStatus;
use super::types::{Exchange, OrderType, Product, Side};
use crate::domain::shared::{AccountId, BrokerOrderId, OrderId, UserId};

/// An order held in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    account_id: AccountId,
    symbol: String,
    exchange: Exchange,
    side: Side,
    quantity: Decimal,
    order_type: OrderType,
    product: Product,
    price: Option<Decimal>,
    trigger_price: Option<Decimal>,
    status: OrderStatus,
    broker_order_id: Option<BrokerOrderId>,
    status_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order in `PENDING` from a client request.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InvalidParameters` if the request fails its own checks.
    pub fn new(
        user_id: UserId,
        account_id: AccountId,
        request: &OrderRequest,
    ) -> Result<Self, OrderError> {
        request.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: OrderId::generate(),
            user_id,
            account_id,
            symbol: request.symbol.trim().to_ascii_uppercase(),
            exchange: request.exchange,
            side: request.side,
            quantity: request.quantity,
            order_type: request.order_type,
            product: request.product,
            price: request.price,
            trigger_price: request.trigger_price,
            status: OrderStatus::Pending,
            broker_order_id: None,
            status_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    // Accessors

    /// Ledger-local id.
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        &self.id
    }

    /// Owning user.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Broker account.
    #[must_use]
    pub const fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// Trading symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Exchange.
    #[must_use]
    pub const fn exchange(&self) -> Exchange {
        self.exchange
    }

    /// Side.
    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Quantity.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Order type.
    #[must_use]
    pub const fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Product.
    #[must_use]
    pub const fn product(&self) -> Product {
        self.product
    }

    /// Limit price.
    #[must_use]
    pub const fn price(&self) -> Option<Decimal> {
        self.price
    }

    /// Trigger price.
    #[must_use]
    pub const fn trigger_price(&self) -> Option<Decimal> {
        self.trigger_price
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Broker-assigned id, present once the broker accepted the order.
    #[must_use]
    pub const fn broker_order_id(&self) -> Option<&BrokerOrderId> {
        self.broker_order_id.as_ref()
    }

    /// Last status message (broker rejection text, failure reason).
    #[must_use]
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification time.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // Transitions

    /// Move to `to` if the state machine allows it.
    ///
    /// `SUBMITTED` is reached only through [`Self::mark_submitted`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` for illegal moves and
    /// `MissingBrokerOrderId` if `to` needs a broker id the order lacks.
    pub fn transition_to(&mut self, to: OrderStatus) -> Result<(), OrderError> {
        OrderStateMachine::validate_transition(self.status, to)?;
        if to.requires_broker_order_id() && self.broker_order_id.is_none() {
            return Err(OrderError::MissingBrokerOrderId {
                order_id: self.id.to_string(),
                status: to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the broker's acceptance: `VALIDATED -> SUBMITTED` with the broker id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the order is `VALIDATED`.
    pub fn mark_submitted(&mut self, broker_order_id: BrokerOrderId) -> Result<(), OrderError> {
        OrderStateMachine::validate_transition(self.status, OrderStatus::Submitted)?;
        self.broker_order_id = Some(broker_order_id);
        self.status = OrderStatus::Submitted;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Move to `FAILED`, keeping the reason as the status message.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the order is `VALIDATED` or `SUBMITTED`.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        OrderStateMachine::validate_transition(self.status, OrderStatus::Failed)?;
        self.status = OrderStatus::Failed;
        self.status_message = Some(reason.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Attach a status message (e.g. broker rejection text) without changing status.
    pub fn set_status_message(&mut self, message: Option<String>) {
        if message.is_some() {
            self.status_message = message;
        }
    }
}
