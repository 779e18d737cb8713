//! Crate-level error type for the ledger.
//!
//! Component errors roll up into [`LedgerError`]. Each kind maps to an
//! [`ErrorCode`] with a stable reason string and an HTTP-equivalent status.
//!
//! | Code | HTTP | Usage |
//! |------|------|-------|
//! | `VALIDATION_ERROR` | 400 | Malformed or unacceptable order |
//! | `INVALID_STATE_TRANSITION` | 409 | Move not in the order graph |
//! | `CONFLICT` | 409 | Idempotency key reuse, in-progress duplicate, busy order |
//! | `BROKER_TIMEOUT` | 504 | Broker did not answer in time |
//! | `BROKER_CONNECTION_FAILURE` | 502 | Broker unreachable |
//! | `BROKER_REJECTED` | 422 | Broker refused the request |
//! | `BROKER_AUTHENTICATION_FAILURE` | 502 | Broker session refused |
//! | `BROKER_UNKNOWN_ERROR` | 502 | Unclassifiable broker failure |
//! | `RECONCILIATION_ABORTED` | 503 | Broker truth unavailable |
//! | `ORDER_NOT_FOUND` | 404 | Unknown order id |
//! | `STORE_ERROR` | 500 | Persistence failure |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::ports::StoreError;
use crate::application::services::{
    ConflictError, GatewayError, IdempotencyError, ReconciliationError,
};
use crate::domain::order::{OrderError, OrderStatus};
use crate::domain::shared::OrderId;

/// Error codes for the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Invalid order payload.
    ValidationError,
    /// Illegal order status change.
    InvalidStateTransition,
    /// Duplicate or racing request.
    Conflict,
    /// Broker call timed out.
    BrokerTimeout,
    /// Broker unreachable.
    BrokerConnectionFailure,
    /// Broker refused the request.
    BrokerRejected,
    /// Broker refused the session.
    BrokerAuthenticationFailure,
    /// Unclassified broker failure.
    BrokerUnknownError,
    /// Reconciliation could not run.
    ReconciliationAborted,
    /// Order not found.
    OrderNotFound,
    /// Persistence failure.
    StoreError,
}

impl ErrorCode {
    /// Stable reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            Self::Conflict => "CONFLICT",
            Self::BrokerTimeout => "BROKER_TIMEOUT",
            Self::BrokerConnectionFailure => "BROKER_CONNECTION_FAILURE",
            Self::BrokerRejected => "BROKER_REJECTED",
            Self::BrokerAuthenticationFailure => "BROKER_AUTHENTICATION_FAILURE",
            Self::BrokerUnknownError => "BROKER_UNKNOWN_ERROR",
            Self::ReconciliationAborted => "RECONCILIATION_ABORTED",
            Self::OrderNotFound => "ORDER_NOT_FOUND",
            Self::StoreError => "STORE_ERROR",
        }
    }

    /// HTTP-equivalent status.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::InvalidStateTransition | Self::Conflict => 409,
            Self::BrokerTimeout => 504,
            Self::BrokerRejected => 422,
            Self::BrokerConnectionFailure
            | Self::BrokerAuthenticationFailure
            | Self::BrokerUnknownError => 502,
            Self::ReconciliationAborted => 503,
            Self::OrderNotFound => 404,
            Self::StoreError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// Top-level ledger error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The order payload failed validation.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// Offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The requested status change is not an edge of the order graph.
    #[error("Invalid state transition {from} -> {to}: {reason}")]
    InvalidStateTransition {
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
        /// Why it was refused.
        reason: String,
    },

    /// Duplicate or racing request.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Classified broker failure.
    #[error(transparent)]
    Broker(#[from] GatewayError),

    /// Reconciliation could not fetch the data it compares.
    #[error("Reconciliation aborted: {0}")]
    ReconciliationAborted(#[from] ReconciliationError),

    /// No order with this id.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// Persistence failure.
    #[error(transparent)]
    Store(StoreError),
}

impl LedgerError {
    /// Shorthand for a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::Broker(err) => match err {
                GatewayError::Timeout => ErrorCode::BrokerTimeout,
                GatewayError::ConnectionFailure(_) => ErrorCode::BrokerConnectionFailure,
                GatewayError::BrokerRejected { .. } => ErrorCode::BrokerRejected,
                GatewayError::AuthenticationFailure(_) => ErrorCode::BrokerAuthenticationFailure,
                GatewayError::UnknownError(_) => ErrorCode::BrokerUnknownError,
            },
            Self::ReconciliationAborted(_) => ErrorCode::ReconciliationAborted,
            Self::NotFound(_) => ErrorCode::OrderNotFound,
            Self::Store(_) => ErrorCode::StoreError,
        }
    }

    /// Only broker timeouts and connection failures are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Broker(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Error body for an HTTP-style response.
    #[must_use]
    pub fn to_http_response(&self) -> HttpErrorResponse {
        let code = self.code();
        HttpErrorResponse {
            status: code.http_status(),
            code,
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}

impl From<OrderError> for LedgerError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidParameters { field, message } => Self::Validation { field, message },
            OrderError::InvalidStateTransition { from, to, reason } => {
                Self::InvalidStateTransition { from, to, reason }
            }
            OrderError::MissingBrokerOrderId { order_id, status } => Self::InvalidStateTransition {
                from: status,
                to: status,
                reason: format!("order {order_id} has no broker order id"),
            },
        }
    }
}

impl From<IdempotencyError> for LedgerError {
    fn from(err: IdempotencyError) -> Self {
        match err {
            IdempotencyError::Conflict(conflict) => Self::Conflict(conflict),
            IdempotencyError::Store(store) => Self::Store(store),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(id) => Self::NotFound(id),
            StoreError::StatusConflict {
                order_id,
                expected,
                actual,
            } => Self::InvalidStateTransition {
                from: actual,
                to: expected,
                reason: format!("order {order_id} changed concurrently (expected {expected})"),
            },
            other => Self::Store(other),
        }
    }
}

/// Serializable error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    /// HTTP-equivalent status.
    pub status: u16,
    /// Stable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Whether retrying the same request may succeed.
    pub retryable: bool,
}
