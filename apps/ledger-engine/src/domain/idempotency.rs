//! Idempotency records and request fingerprints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::shared::{IdempotencyKey, UserId};

/// Lifecycle of an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    /// The first request with this key is still executing.
    Pending,
    /// The request finished; its response is stored for replay.
    Completed,
}

/// A remembered request, scoped to `(user, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Requesting user.
    pub user_id: UserId,
    /// Client key.
    pub key: IdempotencyKey,
    /// SHA-256 of the canonical payload.
    pub fingerprint: String,
    /// Pending or completed.
    pub state: RecordState,
    /// Response bytes, present once completed.
    pub response: Option<Vec<u8>>,
    /// First seen.
    pub created_at: DateTime<Utc>,
    /// After this instant the record is treated as absent.
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// A fresh pending record.
    #[must_use]
    pub fn pending(
        user_id: UserId,
        key: IdempotencyKey,
        fingerprint: String,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            key,
            fingerprint,
            state: RecordState::Pending,
            response: None,
            created_at: now,
            expires_at,
        }
    }

    /// Whether the record has outlived its retention window.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Fingerprint a JSON payload: canonical form (object keys sorted at every
/// depth, arrays in order) hashed with SHA-256, hex encoded.
#[must_use]
pub fn fingerprint(payload: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(payload, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Strings serialize infallibly; Value's Display is its JSON form.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
