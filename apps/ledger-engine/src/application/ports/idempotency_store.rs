//! Idempotency Store Port (Driven Port)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::ledger_store::StoreError;
use crate::domain::idempotency::IdempotencyRecord;
use crate::domain::shared::{IdempotencyKey, UserId};

/// Outcome of an insert-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingInsert {
    /// No live record existed; the new pending record was stored.
    Inserted,
    /// A live record already exists for `(user, key)`.
    Existing(IdempotencyRecord),
}

/// Storage for idempotency records.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically store `record` unless a live record exists for its
    /// `(user, key)`. Records expired at `now` count as absent.
    async fn insert_pending(
        &self,
        record: IdempotencyRecord,
        now: DateTime<Utc>,
    ) -> Result<PendingInsert, StoreError>;

    /// Mark a record completed with its response and new expiry.
    ///
    /// Fails with `StoreError::RecordNotFound` when no live record for
    /// `(user, key)` carries `fingerprint`; nothing is written then.
    async fn complete(
        &self,
        user_id: &UserId,
        key: &IdempotencyKey,
        fingerprint: &str,
        response: Vec<u8>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Drop a pending record.
    async fn remove_pending(&self, user_id: &UserId, key: &IdempotencyKey)
    -> Result<(), StoreError>;

    /// Remove every record expired at `now`, returning how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}
