//! Order domain errors.

use thiserror::Error;

use super::status::OrderStatus;

/// Errors raised by the order aggregate and its state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Invalid state transition attempted.
    #[error("Invalid order state transition: {from} -> {to}: {reason}")]
    InvalidStateTransition {
        /// Current order status.
        from: OrderStatus,
        /// Attempted status.
        to: OrderStatus,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid order parameters.
    #[error("Invalid order parameter '{field}': {message}")]
    InvalidParameters {
        /// Field with invalid value.
        field: String,
        /// Error message.
        message: String,
    },

    /// A status that needs a broker order id was requested without one.
    #[error("Order {order_id} cannot enter {status} without a broker order id")]
    MissingBrokerOrderId {
        /// Order ID.
        order_id: String,
        /// Status that was requested.
        status: OrderStatus,
    },
}

impl OrderError {
    /// Shorthand for an invalid-parameter error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            field: field.into(),
            message: message.into(),
        }
    }
}
