//! Data Transfer Objects
//!
//! Shapes exchanged with clients and broker postbacks.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{Exchange, Order, OrderStatus, OrderType, Product, Side};
use crate::domain::shared::{BrokerOrderId, OrderId};

/// Order as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    /// Ledger order id.
    pub order_id: OrderId,
    /// Broker order id, once submitted.
    pub broker_order_id: Option<BrokerOrderId>,
    /// Current status.
    pub status: OrderStatus,
    /// Trading symbol.
    pub symbol: String,
    /// Exchange.
    pub exchange: Exchange,
    /// Side.
    pub side: Side,
    /// Quantity.
    pub quantity: Decimal,
    /// Order type.
    pub order_type: OrderType,
    /// Product.
    pub product: Product,
    /// Limit price.
    pub price: Option<Decimal>,
    /// Trigger price.
    pub trigger_price: Option<Decimal>,
    /// Broker or ledger message.
    pub status_message: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id().clone(),
            broker_order_id: order.broker_order_id().cloned(),
            status: order.status(),
            symbol: order.symbol().to_string(),
            exchange: order.exchange(),
            side: order.side(),
            quantity: order.quantity(),
            order_type: order.order_type(),
            product: order.product(),
            price: order.price(),
            trigger_price: order.trigger_price(),
            status_message: order.status_message().map(str::to_string),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

/// Response of an idempotent mutation.
///
/// `body` is the exact byte sequence stored on first completion; a replay
/// returns the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotentResponse {
    /// Serialized response body.
    pub body: Vec<u8>,
    /// Whether the body was replayed from an earlier request.
    pub replayed: bool,
}

impl IdempotentResponse {
    /// Decode the body as an order response.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the body is not an `OrderResponse`.
    pub fn order(&self) -> Result<OrderResponse, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Order status update pushed by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerOrderUpdate {
    /// Broker order id.
    pub order_id: BrokerOrderId,
    /// Raw broker status.
    pub status: String,
    /// Filled quantity.
    #[serde(default)]
    pub filled_quantity: Decimal,
    /// Average fill price.
    #[serde(default)]
    pub average_price: Decimal,
    /// Broker message.
    #[serde(default)]
    pub status_message: Option<String>,
}
