//! Dependency Injection Container
//!
//! Builds every ledger component from [`LedgerConfig`] and wires them
//! together.

use std::sync::Arc;

use thiserror::Error;

use crate::application::ports::{BrokerClient, BrokerClientError};
use crate::application::services::{
    AdaptiveCache, BrokerGateway, IdempotencyGuard, InFlightOrders, LedgerService,
    LedgerServiceConfig, OrderLedger, ReconciliationEngine,
};
use crate::config::{ConfigError, LedgerConfig};
use crate::domain::shared::AccountId;
use crate::infrastructure::broker::HttpBrokerClient;
use crate::infrastructure::persistence::{
    InMemoryCacheStore, InMemoryIdempotencyStore, InMemoryInstrumentCatalog, InMemoryLedgerStore,
};

/// Ledger service wired to the in-memory stores and broker client `C`.
pub type ServiceFor<C> = LedgerService<
    InMemoryLedgerStore,
    InMemoryIdempotencyStore,
    InMemoryCacheStore,
    C,
    InMemoryInstrumentCatalog,
>;

/// Ledger service talking to the real broker.
pub type LiveLedgerService = ServiceFor<HttpBrokerClient>;

/// Why the container could not be built.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Configuration could not be turned into components.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The broker client could not be created.
    #[error("failed to create broker client: {0}")]
    Broker(#[from] BrokerClientError),
}

/// Dependency injection container.
pub struct Container<C: BrokerClient + 'static> {
    config: LedgerConfig,
    ledger_store: Arc<InMemoryLedgerStore>,
    idempotency_store: Arc<InMemoryIdempotencyStore>,
    cache_store: Arc<InMemoryCacheStore>,
    gateway: Arc<BrokerGateway<C>>,
    service: Arc<ServiceFor<C>>,
}

impl Container<HttpBrokerClient> {
    /// Build the container with the HTTP broker client.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or the config is inconsistent.
    pub fn from_config(config: LedgerConfig) -> Result<Self, ContainerError> {
        let broker = HttpBrokerClient::from_config(&config.broker)?;
        Self::with_broker(config, Arc::new(broker))
    }
}

impl<C: BrokerClient + 'static> Container<C> {
    /// Build the container around an existing broker client.
    ///
    /// # Errors
    ///
    /// Returns an error if the market hours do not parse.
    pub fn with_broker(config: LedgerConfig, broker: Arc<C>) -> Result<Self, ContainerError> {
        let account_id = AccountId::new(config.broker.account_id.clone());
        let market_hours = config.cache.market_hours.to_market_hours()?;

        let ledger_store = Arc::new(InMemoryLedgerStore::new());
        let idempotency_store = Arc::new(InMemoryIdempotencyStore::new());
        let cache_store = Arc::new(InMemoryCacheStore::new());
        let catalog = Arc::new(InMemoryInstrumentCatalog::new(
            config
                .instruments
                .iter()
                .map(|i| (i.exchange, i.symbol.as_str())),
        ));
        let gateway = Arc::new(BrokerGateway::new(broker, config.broker.request_timeout()));
        let in_flight = Arc::new(InFlightOrders::new());

        let ledger = Arc::new(OrderLedger::new(
            account_id.clone(),
            Arc::clone(&ledger_store),
            Arc::clone(&gateway),
            catalog,
            Arc::clone(&in_flight),
        ));
        let guard = IdempotencyGuard::new(Arc::clone(&idempotency_store))
            .with_retention(config.idempotency.retention());
        let cache = AdaptiveCache::new(
            Arc::clone(&cache_store),
            Arc::clone(&gateway),
            config.cache.to_ttls(),
        );
        let retry = config.retry.to_policy();
        let reconciliation = ReconciliationEngine::new(
            account_id,
            Arc::clone(&ledger_store),
            Arc::clone(&gateway),
            in_flight,
            retry.clone(),
        );

        let service = Arc::new(LedgerService::new(
            ledger,
            guard,
            cache,
            reconciliation,
            LedgerServiceConfig {
                submit_retry: retry,
                enforce_margin_check: config.risk.enforce_margin_check,
                market_hours,
            },
        ));

        Ok(Self {
            config,
            ledger_store,
            idempotency_store,
            cache_store,
            gateway,
            service,
        })
    }

    /// Loaded configuration.
    pub const fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Get the ledger service.
    pub fn service(&self) -> Arc<ServiceFor<C>> {
        Arc::clone(&self.service)
    }

    /// Get the broker gateway.
    pub fn gateway(&self) -> Arc<BrokerGateway<C>> {
        Arc::clone(&self.gateway)
    }

    /// Get the ledger store.
    pub fn ledger_store(&self) -> Arc<InMemoryLedgerStore> {
        Arc::clone(&self.ledger_store)
    }

    /// Get the idempotency store.
    pub fn idempotency_store(&self) -> Arc<InMemoryIdempotencyStore> {
        Arc::clone(&self.idempotency_store)
    }

    /// Get the cache store.
    pub fn cache_store(&self) -> Arc<InMemoryCacheStore> {
        Arc::clone(&self.cache_store)
    }
}
