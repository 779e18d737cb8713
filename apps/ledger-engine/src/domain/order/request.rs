//! Client order request and its intrinsic validation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::OrderError;
use super::types::{Exchange, OrderType, Product, Side};

/// A client's request to place an order, as carried in the request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Trading symbol (e.g. `INFY`).
    #[serde(alias = "tradingsymbol")]
    pub symbol: String,
    /// Exchange the symbol trades on.
    pub exchange: Exchange,
    /// Buy or sell.
    #[serde(alias = "transaction_type")]
    pub side: Side,
    /// Quantity in units (lots are expanded by the client).
    pub quantity: Decimal,
    /// Order type.
    pub order_type: OrderType,
    /// Margin product.
    pub product: Product,
    /// Limit price, required for LIMIT and SL orders.
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Trigger price, required for SL and SL-M orders.
    #[serde(default)]
    pub trigger_price: Option<Decimal>,
}

impl OrderRequest {
    /// Check the request's own fields. Instrument existence is checked by the ledger.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InvalidParameters` naming the first offending field.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.symbol.trim().is_empty() {
            return Err(OrderError::invalid("symbol", "symbol must not be empty"));
        }

        if self.quantity <= Decimal::ZERO {
            return Err(OrderError::invalid(
                "quantity",
                format!("quantity must be positive, got {}", self.quantity),
            ));
        }

        if self.order_type.requires_price() {
            match self.price {
                Some(price) if price > Decimal::ZERO => {}
                Some(price) => {
                    return Err(OrderError::invalid(
                        "price",
                        format!("price must be positive, got {price}"),
                    ));
                }
                None => {
                    return Err(OrderError::invalid(
                        "price",
                        format!("{} orders require a price", self.order_type),
                    ));
                }
            }
        } else if let Some(price) = self.price {
            if price < Decimal::ZERO {
                return Err(OrderError::invalid(
                    "price",
                    format!("price must not be negative, got {price}"),
                ));
            }
        }

        if self.order_type.requires_trigger_price() {
            match self.trigger_price {
                Some(trigger) if trigger > Decimal::ZERO => {}
                _ => {
                    return Err(OrderError::invalid(
                        "trigger_price",
                        format!("{} orders require a positive trigger price", self.order_type),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Price used for notional checks: the limit price, else the trigger price.
    #[must_use]
    pub fn reference_price(&self) -> Option<Decimal> {
        self.price
            .filter(|p| *p > Decimal::ZERO)
            .or(self.trigger_price)
            .filter(|p| *p > Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limit_buy() -> OrderRequest {
        OrderRequest {
            symbol: "INFY".to_string(),
            exchange: Exchange::Nse,
            side: Side::Buy,
            quantity: dec!(10),
            order_type: OrderType::Limit,
            product: Product::Cnc,
            price: Some(dec!(1500.50)),
            trigger_price: None,
        }
    }

    #[test]
    fn accepts_valid_limit_order() {
        assert!(limit_buy().validate().is_ok());
    }

    #[test]
    fn rejects_zero_quantity() {
        let request = OrderRequest {
            quantity: Decimal::ZERO,
            ..limit_buy()
        };
        let err = request.validate().unwrap_err();
        assert!(matches!(err, OrderError::InvalidParameters { ref field, .. } if field == "quantity"));
    }

    #[test]
    fn rejects_negative_quantity() {
        let request = OrderRequest {
            quantity: dec!(-1),
            ..limit_buy()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn limit_order_requires_price() {
        let request = OrderRequest {
            price: None,
            ..limit_buy()
        };
        let err = request.validate().unwrap_err();
        assert!(matches!(err, OrderError::InvalidParameters { ref field, .. } if field == "price"));
    }

    #[test]
    fn limit_order_rejects_non_positive_price() {
        let request = OrderRequest {
            price: Some(Decimal::ZERO),
            ..limit_buy()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn stop_loss_market_requires_trigger() {
        let request = OrderRequest {
            order_type: OrderType::StopLossMarket,
            price: None,
            trigger_price: None,
            ..limit_buy()
        };
        let err = request.validate().unwrap_err();
        assert!(
            matches!(err, OrderError::InvalidParameters { ref field, .. } if field == "trigger_price")
        );
    }

    #[test]
    fn market_order_needs_no_price() {
        let request = OrderRequest {
            order_type: OrderType::Market,
            price: None,
            ..limit_buy()
        };
        assert!(request.validate().is_ok());
        assert_eq!(request.reference_price(), None);
    }

    #[test]
    fn deserializes_broker_style_aliases() {
        let request: OrderRequest = serde_json::from_value(serde_json::json!({
            "tradingsymbol": "INFY",
            "exchange": "NSE",
            "transaction_type": "SELL",
            "quantity": 5,
            "order_type": "MARKET",
            "product": "MIS"
        }))
        .unwrap();
        assert_eq!(request.side, Side::Sell);
        assert_eq!(request.quantity, dec!(5));
        assert_eq!(request.price, None);
    }
}
