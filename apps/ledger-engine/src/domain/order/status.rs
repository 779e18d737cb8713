//! Order status in the ledger lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status as tracked by the ledger.
///
/// ```text
/// PENDING -> VALIDATED -> SUBMITTED -> OPEN -> COMPLETE | CANCELLED
///                |            |
///                +-> FAILED <-+-> REJECTED -> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Recorded locally, not yet validated.
    Pending,
    /// Passed validation, ready to send to the broker.
    Validated,
    /// Accepted by the broker, which has assigned an order id.
    Submitted,
    /// Live on the exchange order book.
    Open,
    /// Rejected by the broker or exchange after submission.
    Rejected,
    /// Fully executed.
    Complete,
    /// Cancelled.
    Cancelled,
    /// Submission failed fatally; the order never reached the book.
    Failed,
}

impl OrderStatus {
    /// Returns true if the order can never change status again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::Failed)
    }

    /// Returns true if the broker should currently know about this order as live.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Submitted | Self::Open)
    }

    /// Returns true if a broker order id must be attached in this status.
    #[must_use]
    pub const fn requires_broker_order_id(&self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::Open | Self::Rejected | Self::Complete | Self::Cancelled
        )
    }

    /// Stable upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Validated => "VALIDATED",
            Self::Submitted => "SUBMITTED",
            Self::Open => "OPEN",
            Self::Rejected => "REJECTED",
            Self::Complete => "COMPLETE",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
        }
    }

    /// Map a raw broker order status onto the ledger's status set.
    ///
    /// Returns `None` for statuses the ledger does not recognise.
    #[must_use]
    pub fn from_broker(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN"
            | "TRIGGER PENDING"
            | "AMO REQ RECEIVED"
            | "OPEN PENDING"
            | "VALIDATION PENDING"
            | "PUT ORDER REQ RECEIVED"
            | "MODIFY PENDING"
            | "MODIFY VALIDATION PENDING"
            | "CANCEL PENDING" => Some(Self::Open),
            "COMPLETE" => Some(Self::Complete),
            "CANCELLED" => Some(Self::Cancelled),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
