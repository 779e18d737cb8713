//! Adaptive Cache
//!
//! Read-through cache for broker reference data (margins, positions). The
//! TTL follows account activity:
//!
//! | Market | Open orders or positions | TTL |
//! |--------|--------------------------|-----|
//! | open | yes | `active` (5s) |
//! | open | no | `quiet` (30s) |
//! | closed | any | `idle` (300s) |
//!
//! Each refresh also writes a long-lived shadow copy under `{key}:stale`,
//! served when the broker cannot be reached.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::application::ports::{BrokerClient, BrokerPosition, CacheStore};
use crate::domain::market::{Margin, MarketHours};
use crate::domain::shared::AccountId;
use crate::observability::metrics;

use super::broker_gateway::{BrokerGateway, GatewayError};

/// TTL per activity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Market open with live orders or positions.
    pub active: Duration,
    /// Market open, nothing live.
    pub quiet: Duration,
    /// Market closed.
    pub idle: Duration,
    /// Lifetime of the stale shadow copy.
    pub stale: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            active: Duration::from_secs(5),
            quiet: Duration::from_secs(30),
            idle: Duration::from_secs(300),
            stale: Duration::from_secs(3600),
        }
    }
}

/// Account activity used to pick a TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivityPolicy {
    /// Market in session.
    pub market_open: bool,
    /// Orders live at the broker.
    pub has_open_orders: bool,
    /// Non-flat positions.
    pub has_open_positions: bool,
}

impl ActivityPolicy {
    /// Policy at `now` for the given session and account activity.
    #[must_use]
    pub fn at(
        now: DateTime<Utc>,
        hours: &MarketHours,
        has_open_orders: bool,
        has_open_positions: bool,
    ) -> Self {
        Self {
            market_open: hours.is_open(now),
            has_open_orders,
            has_open_positions,
        }
    }

    /// Activity tier label.
    #[must_use]
    pub const fn tier(&self) -> &'static str {
        match (self.market_open, self.has_open_orders || self.has_open_positions) {
            (true, true) => "active",
            (true, false) => "quiet",
            (false, _) => "idle",
        }
    }

    /// TTL for this tier.
    #[must_use]
    pub const fn ttl(&self, ttls: &CacheTtls) -> Duration {
        match (self.market_open, self.has_open_orders || self.has_open_positions) {
            (true, true) => ttls.active,
            (true, false) => ttls.quiet,
            (false, _) => ttls.idle,
        }
    }
}

/// Where a cached read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Live cache entry.
    Cache,
    /// Fresh broker fetch.
    Broker,
    /// Stale shadow copy after a broker failure.
    StaleFallback,
}

impl ReadSource {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Broker => "broker",
            Self::StaleFallback => "stale_fallback",
        }
    }
}

/// A value and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRead<T> {
    /// The value.
    pub value: T,
    /// Its source.
    pub source: ReadSource,
}

/// Cache key for an account's margins.
#[must_use]
pub fn margins_key(account_id: &AccountId) -> String {
    format!("margins:{account_id}")
}

/// Cache key for an account's positions.
#[must_use]
pub fn positions_key(account_id: &AccountId) -> String {
    format!("positions:{account_id}")
}

fn stale_key(key: &str) -> String {
    format!("{key}:stale")
}

/// Activity-aware read-through cache in front of the broker gateway.
pub struct AdaptiveCache<K: CacheStore, C: BrokerClient> {
    store: Arc<K>,
    gateway: Arc<BrokerGateway<C>>,
    ttls: CacheTtls,
}

impl<K: CacheStore, C: BrokerClient> AdaptiveCache<K, C> {
    /// Create a cache.
    pub const fn new(store: Arc<K>, gateway: Arc<BrokerGateway<C>>, ttls: CacheTtls) -> Self {
        Self {
            store,
            gateway,
            ttls,
        }
    }

    /// Configured TTLs.
    #[must_use]
    pub const fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    /// Serve `key` from cache, or fetch, store and return it.
    ///
    /// Unreadable or undecodable cache entries count as misses. A failed
    /// cache write does not fail the read.
    ///
    /// # Errors
    ///
    /// The fetch error, when no stale copy exists.
    pub async fn get_or_refresh<T, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        policy: &ActivityPolicy,
    ) -> Result<CacheRead<T>, GatewayError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        if let Some(value) = self.read::<T>(key).await {
            metrics::record_cache_read(ReadSource::Cache.as_str());
            return Ok(CacheRead {
                value,
                source: ReadSource::Cache,
            });
        }

        match fetch().await {
            Ok(value) => {
                self.write(key, &value, policy.ttl(&self.ttls)).await;
                debug!(key, tier = policy.tier(), "Cache refreshed from broker");
                metrics::record_cache_read(ReadSource::Broker.as_str());
                Ok(CacheRead {
                    value,
                    source: ReadSource::Broker,
                })
            }
            Err(err) => match self.read::<T>(&stale_key(key)).await {
                Some(value) => {
                    warn!(key, error = %err, "Broker fetch failed, serving stale copy");
                    metrics::record_cache_read(ReadSource::StaleFallback.as_str());
                    Ok(CacheRead {
                        value,
                        source: ReadSource::StaleFallback,
                    })
                }
                None => Err(err),
            },
        }
    }

    /// Account margins.
    ///
    /// # Errors
    ///
    /// Gateway errors when nothing cached can be served.
    pub async fn margins(
        &self,
        account_id: &AccountId,
        policy: &ActivityPolicy,
    ) -> Result<CacheRead<Vec<Margin>>, GatewayError> {
        let fetch = || async {
            let margins = self.gateway.margins().await?;
            Ok::<_, GatewayError>(
                margins
                    .into_iter()
                    .map(|m| Margin {
                        account_id: account_id.clone(),
                        segment: m.segment,
                        available: m.available,
                        used: m.used,
                        net: m.net,
                    })
                    .collect::<Vec<_>>(),
            )
        };
        self.get_or_refresh(&margins_key(account_id), fetch, policy)
            .await
    }

    /// Broker net positions of the account.
    ///
    /// # Errors
    ///
    /// Gateway errors when nothing cached can be served.
    pub async fn positions(
        &self,
        account_id: &AccountId,
        policy: &ActivityPolicy,
    ) -> Result<CacheRead<Vec<BrokerPosition>>, GatewayError> {
        self.get_or_refresh(
            &positions_key(account_id),
            || self.gateway.positions(),
            policy,
        )
        .await
    }

    /// Drop live entries for the account. Stale copies are kept.
    ///
    /// Returns how many entries were removed; a failed delete counts as none.
    pub async fn invalidate_account(&self, account_id: &AccountId) -> usize {
        let keys = [margins_key(account_id), positions_key(account_id)];
        match self.store.delete(&keys).await {
            Ok(removed) => {
                debug!(account_id = %account_id, removed, "Account cache invalidated");
                removed
            }
            Err(err) => {
                warn!(account_id = %account_id, error = %err, "Cache invalidation failed");
                0
            }
        }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(key, error = %err, "Corrupted cache entry treated as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(key, error = %err, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key, error = %err, "Cache value could not be serialized");
                return;
            }
        };
        if let Err(err) = self.store.setex(key, ttl, bytes.clone()).await {
            warn!(key, error = %err, "Cache write failed");
        }
        if let Err(err) = self
            .store
            .setex(&stale_key(key), self.ttls.stale, bytes)
            .await
        {
            warn!(key, error = %err, "Stale copy write failed");
        }
    }
}
