//! Append-only order state history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::order::OrderStatus;
use super::shared::{OrderId, UserId};

/// Who caused a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// A client request.
    User,
    /// The ledger itself (validation, scheduled jobs).
    System,
    /// A broker postback or status update.
    BrokerCallback,
}

/// The actor attached to an audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Actor kind.
    pub kind: ActorKind,
    /// Actor id (user id, subsystem name, broker name).
    pub id: String,
}

impl Actor {
    /// A user acting through a client request.
    #[must_use]
    pub fn user(user_id: &UserId) -> Self {
        Self {
            kind: ActorKind::User,
            id: user_id.to_string(),
        }
    }

    /// The ledger acting on its own behalf.
    #[must_use]
    pub fn system(component: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::System,
            id: component.into(),
        }
    }

    /// The broker reporting a status change.
    #[must_use]
    pub fn broker_callback(source: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::BrokerCallback,
            id: source.into(),
        }
    }
}

/// Reason and free-form metadata for a state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionContext {
    /// Human-readable reason.
    pub reason: Option<String>,
    /// Structured details (broker ids, error kinds, fill figures).
    pub metadata: BTreeMap<String, Value>,
}

impl TransitionContext {
    /// Context carrying only a reason.
    #[must_use]
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            metadata: BTreeMap::new(),
        }
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A state change waiting to be sequenced by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    /// Order the change applies to.
    pub order_id: OrderId,
    /// Previous status, `None` for the creation record.
    pub from_status: Option<OrderStatus>,
    /// New status.
    pub to_status: OrderStatus,
    /// Who made the change.
    pub actor: Actor,
    /// Why.
    pub context: TransitionContext,
}

impl StateChange {
    /// Attach the store-assigned sequence number and timestamp.
    #[must_use]
    pub fn sequenced(self, sequence: u64, recorded_at: DateTime<Utc>) -> OrderStateHistory {
        OrderStateHistory {
            sequence,
            order_id: self.order_id,
            from_status: self.from_status,
            to_status: self.to_status,
            actor: self.actor,
            context: self.context,
            recorded_at,
        }
    }
}

/// One immutable row of an order's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStateHistory {
    /// Store-wide monotonic sequence.
    pub sequence: u64,
    /// Order id.
    pub order_id: OrderId,
    /// Previous status, `None` for the creation record.
    pub from_status: Option<OrderStatus>,
    /// New status.
    pub to_status: OrderStatus,
    /// Who made the change.
    pub actor: Actor,
    /// Reason and metadata.
    pub context: TransitionContext,
    /// When the record was written.
    pub recorded_at: DateTime<Utc>,
}
