//! Broker Client Port (Driven Port)
//!
//! One method per remote brokerage operation. Implementations report raw
//! transport/API failures; classification happens in the broker gateway.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::{Exchange, Order, OrderType, Product, Segment, Side};
use crate::domain::shared::{BrokerOrderId, TriggerId};

/// Raw failures reported by a broker client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerClientError {
    /// The transport gave up waiting for a response.
    #[error("Request timed out")]
    Timeout,

    /// The connection could not be established or was dropped.
    #[error("Connection error: {0}")]
    Connect(String),

    /// The broker answered with a non-success HTTP status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Broker error class (e.g. `InputException`, `TokenException`).
        error_type: Option<String>,
        /// Broker message.
        message: String,
    },

    /// The broker answered successfully at the transport level but refused the request.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Parameters for placing a regular order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderParams {
    /// Exchange.
    pub exchange: Exchange,
    /// Trading symbol.
    pub tradingsymbol: String,
    /// Buy or sell.
    pub transaction_type: Side,
    /// Quantity.
    pub quantity: Decimal,
    /// Order type.
    pub order_type: OrderType,
    /// Product.
    pub product: Product,
    /// Limit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Trigger price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<Decimal>,
    /// Client tag echoed back by the broker (the ledger order id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl From<&Order> for PlaceOrderParams {
    fn from(order: &Order) -> Self {
        Self {
            exchange: order.exchange(),
            tradingsymbol: order.symbol().to_string(),
            transaction_type: order.side(),
            quantity: order.quantity(),
            order_type: order.order_type(),
            product: order.product(),
            price: order.price(),
            trigger_price: order.trigger_price(),
            tag: Some(order.id().to_string()),
        }
    }
}

/// Parameters for modifying an open order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyOrderParams {
    /// New quantity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    /// New limit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// New trigger price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<Decimal>,
    /// New order type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<OrderType>,
}

/// Parameters for a trigger (GTT) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerOrderParams {
    /// Exchange.
    pub exchange: Exchange,
    /// Trading symbol.
    pub tradingsymbol: String,
    /// Trigger values; one for single triggers, two for OCO.
    pub trigger_values: Vec<Decimal>,
    /// Last traded price when the trigger was set.
    pub last_price: Decimal,
    /// Orders to place when the trigger fires.
    pub orders: Vec<PlaceOrderParams>,
}

/// An order as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerOrder {
    /// Broker order id.
    pub order_id: BrokerOrderId,
    /// Raw broker status (`OPEN`, `COMPLETE`, `TRIGGER PENDING`, ...).
    pub status: String,
    /// Trading symbol.
    pub tradingsymbol: String,
    /// Exchange.
    pub exchange: Exchange,
    /// Side.
    pub transaction_type: Side,
    /// Product.
    pub product: Product,
    /// Ordered quantity.
    pub quantity: Decimal,
    /// Filled quantity.
    #[serde(default)]
    pub filled_quantity: Decimal,
    /// Average fill price.
    #[serde(default)]
    pub average_price: Decimal,
    /// Rejection or cancellation message.
    #[serde(default)]
    pub status_message: Option<String>,
    /// Client tag.
    #[serde(default)]
    pub tag: Option<String>,
}

/// A net position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerPosition {
    /// Trading symbol.
    pub tradingsymbol: String,
    /// Exchange.
    pub exchange: Exchange,
    /// Product.
    pub product: Product,
    /// Signed net quantity.
    pub quantity: Decimal,
    /// Average price.
    #[serde(default)]
    pub average_price: Decimal,
    /// Last traded price.
    #[serde(default)]
    pub last_price: Decimal,
    /// Realised P&L.
    #[serde(default)]
    pub realised: Decimal,
    /// Unrealised P&L.
    #[serde(default)]
    pub unrealised: Decimal,
}

/// A long-term holding as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerHolding {
    /// Trading symbol.
    pub tradingsymbol: String,
    /// Exchange.
    pub exchange: Exchange,
    /// Quantity held.
    pub quantity: Decimal,
    /// Average buy price.
    #[serde(default)]
    pub average_price: Decimal,
}

/// Funds in one margin segment as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerMargin {
    /// Segment.
    pub segment: Segment,
    /// Available for new orders.
    pub available: Decimal,
    /// Utilised.
    pub used: Decimal,
    /// Net.
    pub net: Decimal,
}

/// Remote brokerage operations for one authenticated account session.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Place a regular order; returns the broker order id.
    async fn place_order(&self, params: &PlaceOrderParams)
    -> Result<BrokerOrderId, BrokerClientError>;

    /// Modify an open order.
    async fn modify_order(
        &self,
        order_id: &BrokerOrderId,
        params: &ModifyOrderParams,
    ) -> Result<BrokerOrderId, BrokerClientError>;

    /// Cancel an open order.
    async fn cancel_order(&self, order_id: &BrokerOrderId)
    -> Result<BrokerOrderId, BrokerClientError>;

    /// Place a trigger (GTT) order.
    async fn place_trigger_order(
        &self,
        params: &TriggerOrderParams,
    ) -> Result<TriggerId, BrokerClientError>;

    /// Delete a trigger (GTT) order.
    async fn cancel_trigger_order(&self, trigger_id: &TriggerId)
    -> Result<TriggerId, BrokerClientError>;

    /// Orders of the current trading day.
    async fn orders(&self) -> Result<Vec<BrokerOrder>, BrokerClientError>;

    /// Net positions.
    async fn positions(&self) -> Result<Vec<BrokerPosition>, BrokerClientError>;

    /// Holdings.
    async fn holdings(&self) -> Result<Vec<BrokerHolding>, BrokerClientError>;

    /// Margins per segment.
    async fn margins(&self) -> Result<Vec<BrokerMargin>, BrokerClientError>;
}
