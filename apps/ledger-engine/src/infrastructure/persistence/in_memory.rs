//! In-memory ledger store.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::application::ports::{LedgerStore, StoreError};
use crate::domain::audit::{OrderStateHistory, StateChange};
use crate::domain::market::{Position, PositionKey};
use crate::domain::order::{Order, OrderStatus};
use crate::domain::shared::{AccountId, BrokerOrderId, OrderId};

#[derive(Debug, Default)]
struct LedgerState {
    orders: HashMap<OrderId, Order>,
    broker_index: HashMap<BrokerOrderId, OrderId>,
    history: HashMap<OrderId, Vec<OrderStateHistory>>,
    positions: HashMap<(AccountId, PositionKey), Position>,
    next_sequence: u64,
}

impl LedgerState {
    fn append(&mut self, change: StateChange) -> OrderStateHistory {
        self.next_sequence += 1;
        let entry = change.sequenced(self.next_sequence, Utc::now());
        self.history
            .entry(entry.order_id.clone())
            .or_default()
            .push(entry.clone());
        entry
    }

    fn put_order(&mut self, order: &Order) {
        if let Some(broker_id) = order.broker_order_id() {
            self.broker_index
                .insert(broker_id.clone(), order.id().clone());
        }
        self.orders.insert(order.id().clone(), order.clone());
    }
}

/// In-memory implementation of `LedgerStore`.
///
/// Orders, history and positions live under one lock, so an order write and
/// its history row are applied together.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of orders held.
    pub fn len(&self) -> usize {
        self.read().map(|s| s.orders.len()).unwrap_or(0)
    }

    /// Whether the store holds no orders.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("ledger state lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("ledger state lock poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_order(
        &self,
        order: &Order,
        creation: StateChange,
    ) -> Result<OrderStateHistory, StoreError> {
        let mut state = self.write()?;
        if state.orders.contains_key(order.id()) {
            return Err(StoreError::DuplicateOrder(order.id().clone()));
        }
        state.put_order(order);
        Ok(state.append(creation))
    }

    async fn commit_transition(
        &self,
        order: &Order,
        expected_from: OrderStatus,
        change: StateChange,
    ) -> Result<OrderStateHistory, StoreError> {
        let mut state = self.write()?;
        let actual = state
            .orders
            .get(order.id())
            .map(Order::status)
            .ok_or_else(|| StoreError::OrderNotFound(order.id().clone()))?;
        if actual != expected_from {
            return Err(StoreError::StatusConflict {
                order_id: order.id().clone(),
                expected: expected_from,
                actual,
            });
        }
        state.put_order(order);
        Ok(state.append(change))
    }

    async fn append_history(&self, change: StateChange) -> Result<OrderStateHistory, StoreError> {
        let mut state = self.write()?;
        if !state.orders.contains_key(&change.order_id) {
            return Err(StoreError::OrderNotFound(change.order_id));
        }
        Ok(state.append(change))
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.read()?.orders.get(id).cloned())
    }

    async fn find_by_broker_id(
        &self,
        broker_order_id: &BrokerOrderId,
    ) -> Result<Option<Order>, StoreError> {
        let state = self.read()?;
        Ok(state
            .broker_index
            .get(broker_order_id)
            .and_then(|id| state.orders.get(id))
            .cloned())
    }

    async fn orders_for_account(&self, account_id: &AccountId) -> Result<Vec<Order>, StoreError> {
        let state = self.read()?;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.account_id() == account_id)
            .cloned()
            .collect();
        orders.sort_by_key(Order::created_at);
        Ok(orders)
    }

    async fn history(&self, order_id: &OrderId) -> Result<Vec<OrderStateHistory>, StoreError> {
        Ok(self
            .read()?
            .history
            .get(order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn positions(&self, account_id: &AccountId) -> Result<Vec<Position>, StoreError> {
        let state = self.read()?;
        let mut positions: Vec<Position> = state
            .positions
            .values()
            .filter(|p| &p.account_id == account_id)
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(positions)
    }

    async fn upsert_position(&self, position: &Position) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.positions.insert(
            (position.account_id.clone(), position.key.clone()),
            position.clone(),
        );
        Ok(())
    }
}
