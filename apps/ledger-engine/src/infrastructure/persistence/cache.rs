//! In-memory cache store with per-key expiry.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::application::ports::{CacheStore, CacheStoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-memory `CacheStore`. Expiry follows tokio's clock, so paused-time
/// tests can advance past a TTL.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCacheStore {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of a key, if it is live.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        entry.expires_at.checked_duration_since(Instant::now())
    }
}

fn poisoned() -> CacheStoreError {
    CacheStoreError::Unavailable("cache lock poisoned".to_string())
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheStoreError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone()))
    }

    async fn setex(&self, key: &str, ttl: Duration, value: Vec<u8>) -> Result<(), CacheStoreError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, CacheStoreError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let now = Instant::now();
        Ok(keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|e| e.expires_at > now)
            .count())
    }
}
