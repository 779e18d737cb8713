//! In-memory idempotency store backed by `DashMap`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::application::ports::{IdempotencyStore, PendingInsert, StoreError};
use crate::domain::idempotency::{IdempotencyRecord, RecordState};
use crate::domain::shared::{IdempotencyKey, UserId};

/// In-memory `IdempotencyStore`.
///
/// Insert-if-absent runs inside a single shard-locked `entry` call, so
/// concurrent first requests for the same key cannot both win.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    records: DashMap<(UserId, IdempotencyKey), IdempotencyRecord>,
}

impl InMemoryIdempotencyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record regardless of expiry.
    #[must_use]
    pub fn get(&self, user_id: &UserId, key: &IdempotencyKey) -> Option<IdempotencyRecord> {
        self.records
            .get(&(user_id.clone(), key.clone()))
            .map(|r| r.value().clone())
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn insert_pending(
        &self,
        record: IdempotencyRecord,
        now: DateTime<Utc>,
    ) -> Result<PendingInsert, StoreError> {
        let id = (record.user_id.clone(), record.key.clone());
        match self.records.entry(id) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_expired(now) {
                    existing.insert(record);
                    Ok(PendingInsert::Inserted)
                } else {
                    Ok(PendingInsert::Existing(existing.get().clone()))
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(PendingInsert::Inserted)
            }
        }
    }

    async fn complete(
        &self,
        user_id: &UserId,
        key: &IdempotencyKey,
        fingerprint: &str,
        response: Vec<u8>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self.records.get_mut(&(user_id.clone(), key.clone())) {
            Some(mut record) if record.fingerprint == fingerprint && !record.is_expired(now) => {
                record.state = RecordState::Completed;
                record.response = Some(response);
                record.expires_at = expires_at;
                Ok(())
            }
            _ => Err(StoreError::RecordNotFound(key.clone())),
        }
    }

    async fn remove_pending(
        &self,
        user_id: &UserId,
        key: &IdempotencyKey,
    ) -> Result<(), StoreError> {
        self.records
            .remove_if(&(user_id.clone(), key.clone()), |_, record| {
                record.state == RecordState::Pending
            });
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        Ok(before.saturating_sub(self.records.len()))
    }
}
