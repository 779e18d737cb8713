//! Idempotency Guard
//!
//! Deduplicates mutating requests by `(user, key)`. The first request for a
//! key stores a pending record and proceeds; later requests either replay
//! the stored response byte-for-byte or are refused with a conflict.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::ports::{IdempotencyStore, PendingInsert, StoreError};
use crate::domain::idempotency::{IdempotencyRecord, RecordState, fingerprint};
use crate::domain::shared::{IdempotencyKey, OrderId, UserId};
use crate::observability::metrics::{self, idempotency_outcome};

/// Default record lifetime, pending or completed.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// Request refused because it would duplicate or race another one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    /// A request with the same key and payload is still executing.
    #[error("Request with idempotency key '{key}' is still in progress")]
    InProgress {
        /// Idempotency key.
        key: IdempotencyKey,
    },

    /// The key was already used with a different payload.
    #[error("Idempotency key '{key}' was already used with a different payload")]
    KeyReused {
        /// Idempotency key.
        key: IdempotencyKey,
    },

    /// Another mutation of the order is in progress.
    #[error("Order {order_id} is being modified by another request")]
    OrderBusy {
        /// Order ID.
        order_id: OrderId,
    },
}

/// Idempotency guard errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdempotencyError {
    /// Duplicate or racing request.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// The record store failed.
    #[error("Idempotency store error: {0}")]
    Store(#[from] StoreError),
}

/// Guards request execution with idempotency records.
pub struct IdempotencyGuard<I: IdempotencyStore> {
    store: Arc<I>,
    retention: Duration,
}

impl<I: IdempotencyStore> IdempotencyGuard<I> {
    /// Create a guard with default retention.
    pub const fn new(store: Arc<I>) -> Self {
        Self {
            store,
            retention: DEFAULT_RETENTION,
        }
    }

    /// Override the record lifetime.
    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Record lifetime.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        self.retention
    }

    /// Check `key` and claim it if unused.
    ///
    /// Returns `None` when the caller should execute the request, or the
    /// stored response bytes when an identical request already completed.
    ///
    /// # Errors
    ///
    /// - `ConflictError::KeyReused` if the key carries a different payload.
    /// - `ConflictError::InProgress` if the identical request is still executing.
    /// - `IdempotencyError::Store` if the record store fails.
    pub async fn check_and_store(
        &self,
        key: &IdempotencyKey,
        user_id: &UserId,
        payload: &Value,
    ) -> Result<Option<Vec<u8>>, IdempotencyError> {
        let fingerprint = fingerprint(payload);
        let now = Utc::now();
        let record = IdempotencyRecord::pending(
            user_id.clone(),
            key.clone(),
            fingerprint.clone(),
            now,
            now + to_chrono(self.retention),
        );

        match self.store.insert_pending(record, now).await? {
            PendingInsert::Inserted => {
                debug!(user_id = %user_id, key = %key, "Idempotency key claimed");
                metrics::record_idempotency_outcome(idempotency_outcome::ACCEPTED);
                Ok(None)
            }
            PendingInsert::Existing(existing) if existing.fingerprint != fingerprint => {
                warn!(user_id = %user_id, key = %key, "Idempotency key reused with a different payload");
                metrics::record_idempotency_outcome(idempotency_outcome::KEY_REUSED);
                Err(ConflictError::KeyReused { key: key.clone() }.into())
            }
            PendingInsert::Existing(existing) => match (existing.state, existing.response) {
                (RecordState::Completed, Some(response)) => {
                    info!(user_id = %user_id, key = %key, "Replaying stored response");
                    metrics::record_idempotency_outcome(idempotency_outcome::REPLAYED);
                    Ok(Some(response))
                }
                _ => {
                    metrics::record_idempotency_outcome(idempotency_outcome::IN_PROGRESS);
                    Err(ConflictError::InProgress { key: key.clone() }.into())
                }
            },
        }
    }

    /// Store the response of a completed request for replay and restart
    /// the record's retention window.
    ///
    /// # Errors
    ///
    /// Returns `IdempotencyError::Store` if the record store fails, or with
    /// `StoreError::RecordNotFound` if the claim is gone (expired or
    /// released) and there is nothing to attach the response to.
    pub async fn store_response(
        &self,
        key: &IdempotencyKey,
        user_id: &UserId,
        payload: &Value,
        response: Vec<u8>,
    ) -> Result<(), IdempotencyError> {
        let now = Utc::now();
        self.store
            .complete(
                user_id,
                key,
                &fingerprint(payload),
                response,
                now + to_chrono(self.retention),
                now,
            )
            .await?;
        Ok(())
    }

    /// Drop the pending claim so the client can retry immediately.
    ///
    /// # Errors
    ///
    /// Returns `IdempotencyError::Store` if the record store fails.
    pub async fn release(
        &self,
        key: &IdempotencyKey,
        user_id: &UserId,
    ) -> Result<(), IdempotencyError> {
        self.store.remove_pending(user_id, key).await?;
        Ok(())
    }

    /// Remove expired records; returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `IdempotencyError::Store` if the record store fails.
    pub async fn purge_expired(&self) -> Result<usize, IdempotencyError> {
        let removed = self.store.purge_expired(Utc::now()).await?;
        if removed > 0 {
            debug!(removed, "Purged expired idempotency records");
        }
        Ok(removed)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
