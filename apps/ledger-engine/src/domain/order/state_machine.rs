//! Order State Machine Service
//!
//! The single source of legal ledger transitions. Anything not listed here
//! is rejected before it reaches storage.

use super::errors::OrderError;
use super::status::OrderStatus;

/// Order State Machine for validating transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a state transition is valid.
    #[must_use]
    pub const fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            // From Pending
            (OrderStatus::Pending, OrderStatus::Validated)
                // From Validated
                | (OrderStatus::Validated, OrderStatus::Submitted)
                | (OrderStatus::Validated, OrderStatus::Failed)
                // From Submitted
                | (OrderStatus::Submitted, OrderStatus::Open)
                | (OrderStatus::Submitted, OrderStatus::Rejected)
                | (OrderStatus::Submitted, OrderStatus::Failed)
                // From Open
                | (OrderStatus::Open, OrderStatus::Complete)
                | (OrderStatus::Open, OrderStatus::Cancelled)
                // From Rejected
                | (OrderStatus::Rejected, OrderStatus::Cancelled)
        )
    }

    /// Validate a state transition.
    ///
    /// # Errors
    ///
    /// Returns error if the transition is invalid.
    pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition {
                from,
                to,
                reason: Self::transition_error_reason(from, to),
            })
        }
    }

    /// Get a human-readable reason for an invalid transition.
    #[must_use]
    pub fn transition_error_reason(from: OrderStatus, to: OrderStatus) -> String {
        match from {
            OrderStatus::Complete => format!("Order is already complete, cannot transition to {to}"),
            OrderStatus::Cancelled => format!("Order is cancelled, cannot transition to {to}"),
            OrderStatus::Failed => format!("Order has failed, cannot transition to {to}"),
            _ if from == to => format!("Order is already {to}"),
            _ => format!("Transitions only move forward; {from} cannot become {to}"),
        }
    }

    /// Get all valid next states from a given state.
    #[must_use]
    pub fn valid_next_states(from: OrderStatus) -> Vec<OrderStatus> {
        match from {
            OrderStatus::Pending => vec![OrderStatus::Validated],
            OrderStatus::Validated => vec![OrderStatus::Submitted, OrderStatus::Failed],
            OrderStatus::Submitted => vec![
                OrderStatus::Open,
                OrderStatus::Rejected,
                OrderStatus::Failed,
            ],
            OrderStatus::Open => vec![OrderStatus::Complete, OrderStatus::Cancelled],
            OrderStatus::Rejected => vec![OrderStatus::Cancelled],
            // Terminal states
            OrderStatus::Complete | OrderStatus::Cancelled | OrderStatus::Failed => vec![],
        }
    }
}
