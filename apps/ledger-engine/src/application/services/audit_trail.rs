//! Audit Trail
//!
//! Append-only history of order status changes. Transitions are committed
//! together with their audit record; if the record cannot be written the
//! status change is not applied either.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::application::ports::{LedgerStore, StoreError};
use crate::domain::audit::{Actor, OrderStateHistory, StateChange, TransitionContext};
use crate::domain::order::{Order, OrderStatus};
use crate::domain::shared::OrderId;
use crate::observability::metrics;

/// Writes and reads order history.
pub struct AuditTrail<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> AuditTrail<S> {
    /// Create an audit trail over `store`.
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append a standalone history record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the record cannot be persisted.
    pub async fn log_state_change(
        &self,
        order_id: &OrderId,
        old_status: Option<OrderStatus>,
        new_status: OrderStatus,
        actor: Actor,
        reason: Option<String>,
        metadata: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<OrderStateHistory, StoreError> {
        let context = TransitionContext {
            reason,
            metadata: metadata.into_iter().collect(),
        };
        self.store
            .append_history(StateChange {
                order_id: order_id.clone(),
                from_status: old_status,
                to_status: new_status,
                actor,
                context,
            })
            .await
    }

    /// Persist a new order with its creation record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if either write fails; neither is applied then.
    pub async fn record_creation(
        &self,
        order: &Order,
        actor: Actor,
        context: TransitionContext,
    ) -> Result<OrderStateHistory, StoreError> {
        let entry = self
            .store
            .insert_order(
                order,
                StateChange {
                    order_id: order.id().clone(),
                    from_status: None,
                    to_status: order.status(),
                    actor,
                    context,
                },
            )
            .await?;
        info!(order_id = %order.id(), status = %order.status(), "Order recorded");
        metrics::record_transition(order.status());
        Ok(entry)
    }

    /// Commit `order` (already moved in memory) and its transition record.
    ///
    /// `expected_from` is the status the stored order must still have.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::StatusConflict` if the stored status moved, or
    /// any other store failure. Nothing is written in either case.
    pub async fn record_transition(
        &self,
        order: &Order,
        expected_from: OrderStatus,
        actor: Actor,
        context: TransitionContext,
    ) -> Result<OrderStateHistory, StoreError> {
        let entry = self
            .store
            .commit_transition(
                order,
                expected_from,
                StateChange {
                    order_id: order.id().clone(),
                    from_status: Some(expected_from),
                    to_status: order.status(),
                    actor,
                    context,
                },
            )
            .await?;
        info!(
            order_id = %order.id(),
            from = %expected_from,
            to = %order.status(),
            actor = %entry.actor.id,
            sequence = entry.sequence,
            "Order transition recorded"
        );
        metrics::record_transition(order.status());
        Ok(entry)
    }

    /// History of `order_id`, oldest first. Read straight from the store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store cannot be read.
    pub async fn get_order_history(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<OrderStateHistory>, StoreError> {
        self.store.history(order_id).await
    }
}
