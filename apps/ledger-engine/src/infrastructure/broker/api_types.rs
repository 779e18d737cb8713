//! Broker REST request and response types.
//!
//! Every response is wrapped in `{"status": "success", "data": ...}` or
//! `{"status": "error", "message": ..., "error_type": ...}`.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Number, Value, json};

use crate::application::ports::{BrokerMargin, BrokerPosition, TriggerOrderParams};
use crate::domain::order::Segment;

// ============================================================================
// Envelope
// ============================================================================

/// Response envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    /// `success` or `error`.
    pub status: String,
    /// Payload on success.
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    /// Error message.
    #[serde(default)]
    pub message: Option<String>,
    /// Error class (`InputException`, `TokenException`, ...).
    #[serde(default)]
    pub error_type: Option<String>,
}

impl<T> Envelope<T> {
    /// Whether the broker reported success.
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Error fields of an envelope, decoded without caring about `data`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    /// Error message.
    #[serde(default)]
    pub message: Option<String>,
    /// Error class.
    #[serde(default)]
    pub error_type: Option<String>,
}

// ============================================================================
// Payloads
// ============================================================================

/// `{"order_id": "..."}`.
#[derive(Debug, Deserialize)]
pub struct OrderIdData {
    /// Broker order id.
    pub order_id: String,
}

/// `{"trigger_id": 123}`.
#[derive(Debug, Deserialize)]
pub struct TriggerIdData {
    /// Trigger id.
    pub trigger_id: u64,
}

/// Positions split by net and day.
#[derive(Debug, Deserialize)]
pub struct PositionsData {
    /// Net positions.
    #[serde(default)]
    pub net: Vec<BrokerPosition>,
}

/// Funds per segment.
#[derive(Debug, Deserialize)]
pub struct MarginsData {
    /// Equity segment.
    #[serde(default)]
    pub equity: Option<SegmentFunds>,
    /// Commodity segment.
    #[serde(default)]
    pub commodity: Option<SegmentFunds>,
}

/// Funds of one segment.
#[derive(Debug, Deserialize)]
pub struct SegmentFunds {
    /// Net funds.
    pub net: Decimal,
    /// Available funds.
    pub available: AvailableFunds,
    /// Utilised funds.
    pub utilised: UtilisedFunds,
}

/// Available part of segment funds.
#[derive(Debug, Deserialize)]
pub struct AvailableFunds {
    /// Balance usable for new orders.
    pub live_balance: Decimal,
}

/// Utilised part of segment funds.
#[derive(Debug, Deserialize)]
pub struct UtilisedFunds {
    /// Total debits.
    pub debits: Decimal,
}

impl MarginsData {
    /// Flatten into one margin per reported segment.
    pub fn into_margins(self) -> Vec<BrokerMargin> {
        [
            (Segment::Equity, self.equity),
            (Segment::Commodity, self.commodity),
        ]
        .into_iter()
        .filter_map(|(segment, funds)| {
            funds.map(|f| BrokerMargin {
                segment,
                available: f.available.live_balance,
                used: f.utilised.debits,
                net: f.net,
            })
        })
        .collect()
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Form fields for creating a trigger order.
///
/// `condition` and `orders` are JSON documents inside the form; prices and
/// quantities in them are JSON numbers.
pub fn trigger_form(params: &TriggerOrderParams) -> Vec<(&'static str, String)> {
    let kind = if params.trigger_values.len() > 1 {
        "two-leg"
    } else {
        "single"
    };
    let condition = json!({
        "exchange": params.exchange,
        "tradingsymbol": params.tradingsymbol,
        "trigger_values": params.trigger_values.iter().copied().map(number).collect::<Vec<_>>(),
        "last_price": number(params.last_price),
    });
    let orders: Vec<Value> = params
        .orders
        .iter()
        .map(|o| {
            json!({
                "exchange": o.exchange,
                "tradingsymbol": o.tradingsymbol,
                "transaction_type": o.transaction_type,
                "quantity": number(o.quantity),
                "order_type": o.order_type,
                "product": o.product,
                "price": o.price.map_or(Value::Null, number),
            })
        })
        .collect();

    vec![
        ("type", kind.to_string()),
        ("condition", condition.to_string()),
        ("orders", Value::Array(orders).to_string()),
    ]
}

/// A decimal as a JSON number: integral values as integers, the rest as
/// floats.
fn number(value: Decimal) -> Value {
    let value = value.normalize();
    if value.fract().is_zero() {
        if let Some(int) = value.to_i64() {
            return Value::from(int);
        }
    }
    value
        .to_f64()
        .and_then(Number::from_f64)
        .map_or(Value::Null, Value::Number)
}
