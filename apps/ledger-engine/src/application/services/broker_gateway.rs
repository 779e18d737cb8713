//! Broker gateway: bounded remote calls with classified failures.
//!
//! Every call is wrapped in a timeout and its failure mapped onto one of
//! five kinds. The gateway never retries; callers decide.
//!
//! | Raw failure | Classified as |
//! |-------------|---------------|
//! | Deadline elapsed, transport timeout, HTTP 504 | `Timeout` |
//! | Connection refused/reset, HTTP 503 | `ConnectionFailure` |
//! | HTTP 401/403, `TokenException` | `AuthenticationFailure` |
//! | Other HTTP 4xx, explicit rejection payload | `BrokerRejected` |
//! | Undecodable body, HTTP 502, other 5xx, anything else | `UnknownError` |
//!
//! A 502 comes from a proxy that may already have forwarded the request, so
//! it is treated like any other uncertain outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::application::ports::{
    BrokerClient, BrokerClientError, BrokerHolding, BrokerMargin, BrokerOrder, BrokerPosition,
    ModifyOrderParams, PlaceOrderParams, TriggerOrderParams,
};
use crate::domain::shared::{BrokerOrderId, TriggerId};
use crate::observability::metrics;

/// Classified broker failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// No response within the deadline. Broker side effects are unknown.
    #[error("Broker call timed out")]
    Timeout,

    /// The broker could not be reached.
    #[error("Broker connection failed: {0}")]
    ConnectionFailure(String),

    /// The broker refused the request; the message is the broker's, verbatim.
    #[error("Broker rejected request: {message}")]
    BrokerRejected {
        /// Broker message.
        message: String,
    },

    /// Session credentials were refused.
    #[error("Broker authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Anything that fits no other kind. Broker side effects are unknown.
    #[error("Unknown broker error: {0}")]
    UnknownError(String),
}

impl GatewayError {
    /// Recoverable kinds a caller may retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionFailure(_))
    }

    /// Kinds that end an order's submission.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }

    /// Kinds after which the broker may or may not have acted.
    #[must_use]
    pub const fn is_outcome_uncertain(&self) -> bool {
        matches!(self, Self::Timeout | Self::UnknownError(_))
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailure(_) => "connection_failure",
            Self::BrokerRejected { .. } => "broker_rejected",
            Self::AuthenticationFailure(_) => "authentication_failure",
            Self::UnknownError(_) => "unknown_error",
        }
    }
}

impl From<BrokerClientError> for GatewayError {
    fn from(err: BrokerClientError) -> Self {
        match err {
            BrokerClientError::Timeout => Self::Timeout,
            BrokerClientError::Connect(message) => Self::ConnectionFailure(message),
            BrokerClientError::Rejected(message) => Self::BrokerRejected { message },
            BrokerClientError::Api {
                status,
                error_type,
                message,
            } => {
                if status == 401
                    || status == 403
                    || error_type.as_deref() == Some("TokenException")
                {
                    Self::AuthenticationFailure(message)
                } else if status == 504 {
                    Self::Timeout
                } else if status == 503 {
                    Self::ConnectionFailure(message)
                } else if (400..500).contains(&status) {
                    Self::BrokerRejected { message }
                } else {
                    Self::UnknownError(format!("HTTP {status}: {message}"))
                }
            }
            BrokerClientError::Decode(message) => {
                Self::UnknownError(format!("undecodable response: {message}"))
            }
            BrokerClientError::Other(message) => Self::UnknownError(message),
        }
    }
}

/// Timeout-bounded, classifying wrapper around a [`BrokerClient`].
pub struct BrokerGateway<C: BrokerClient> {
    client: Arc<C>,
    request_timeout: Duration,
}

impl<C: BrokerClient> BrokerGateway<C> {
    /// Wrap a client; every call is cut off after `request_timeout`.
    pub const fn new(client: Arc<C>, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    /// Configured per-call deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Place a regular order.
    pub async fn place_order(&self, params: &PlaceOrderParams) -> Result<BrokerOrderId, GatewayError> {
        self.call("place_order", self.client.place_order(params)).await
    }

    /// Modify an open order.
    pub async fn modify_order(
        &self,
        order_id: &BrokerOrderId,
        params: &ModifyOrderParams,
    ) -> Result<BrokerOrderId, GatewayError> {
        self.call("modify_order", self.client.modify_order(order_id, params))
            .await
    }

    /// Cancel an open order.
    pub async fn cancel_order(&self, order_id: &BrokerOrderId) -> Result<BrokerOrderId, GatewayError> {
        self.call("cancel_order", self.client.cancel_order(order_id))
            .await
    }

    /// Place a trigger order.
    pub async fn place_trigger_order(
        &self,
        params: &TriggerOrderParams,
    ) -> Result<TriggerId, GatewayError> {
        self.call("place_trigger_order", self.client.place_trigger_order(params))
            .await
    }

    /// Cancel a trigger order.
    pub async fn cancel_trigger_order(&self, trigger_id: &TriggerId) -> Result<TriggerId, GatewayError> {
        self.call(
            "cancel_trigger_order",
            self.client.cancel_trigger_order(trigger_id),
        )
        .await
    }

    /// Orders of the day.
    pub async fn orders(&self) -> Result<Vec<BrokerOrder>, GatewayError> {
        self.call("orders", self.client.orders()).await
    }

    /// Net positions.
    pub async fn positions(&self) -> Result<Vec<BrokerPosition>, GatewayError> {
        self.call("positions", self.client.positions()).await
    }

    /// Holdings.
    pub async fn holdings(&self) -> Result<Vec<BrokerHolding>, GatewayError> {
        self.call("holdings", self.client.holdings()).await
    }

    /// Margins.
    pub async fn margins(&self) -> Result<Vec<BrokerMargin>, GatewayError> {
        self.call("margins", self.client.margins()).await
    }

    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, BrokerClientError>>,
    {
        let result = match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(raw)) => GatewayError::from(raw),
            Err(_) => GatewayError::Timeout,
        };

        warn!(
            operation,
            kind = result.kind(),
            retryable = result.is_retryable(),
            error = %result,
            "Broker call failed"
        );
        metrics::record_broker_failure(operation, result.kind());
        Err(result)
    }
}
