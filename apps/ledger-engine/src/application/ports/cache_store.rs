//! Cache Store Port (Driven Port)
//!
//! Key/value store with per-key expiry (Redis-like `GET` / `SETEX` / `DEL`).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Cache backend failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheStoreError {
    /// The cache could not be reached.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Key/value cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a live value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheStoreError>;

    /// Write a value that expires after `ttl`.
    async fn setex(&self, key: &str, ttl: Duration, value: Vec<u8>) -> Result<(), CacheStoreError>;

    /// Delete keys, returning how many live entries were removed. Missing
    /// keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<usize, CacheStoreError>;
}
