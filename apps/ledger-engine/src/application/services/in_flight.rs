//! Orders currently being mutated by the ledger.

use dashmap::DashSet;

use crate::domain::shared::OrderId;

use super::idempotency_guard::ConflictError;

/// Set of order ids with a mutation in progress.
///
/// Reconciliation skips these; a second concurrent mutation of the same
/// order is refused with [`ConflictError::OrderBusy`].
#[derive(Debug, Default)]
pub struct InFlightOrders {
    orders: DashSet<OrderId>,
}

impl InFlightOrders {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `order_id` busy until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns `ConflictError::OrderBusy` if the order is already in flight.
    pub fn acquire(&self, order_id: &OrderId) -> Result<InFlightGuard<'_>, ConflictError> {
        if self.orders.insert(order_id.clone()) {
            Ok(InFlightGuard {
                set: self,
                order_id: order_id.clone(),
            })
        } else {
            Err(ConflictError::OrderBusy {
                order_id: order_id.clone(),
            })
        }
    }

    /// Whether `order_id` has a mutation in progress.
    #[must_use]
    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.orders.contains(order_id)
    }

    /// Number of in-flight orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Releases the in-flight mark on drop.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    set: &'a InFlightOrders,
    order_id: OrderId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.orders.remove(&self.order_id);
    }
}
