//! Ledger Service
//!
//! The boundary the outside world calls. Mutations run under the
//! idempotency guard; reads go through the ledger, the audit trail and the
//! adaptive cache.
//!
//! A failed mutation releases its key unless the broker was called and may
//! have acted. Only then does the key stay claimed until it expires.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::application::dto::{BrokerOrderUpdate, IdempotentResponse, OrderResponse};
use crate::application::ports::{
    BrokerClient, BrokerPosition, CacheStore, IdempotencyStore, InstrumentCatalog, LedgerStore,
    StoreError,
};
use crate::domain::audit::{Actor, OrderStateHistory};
use crate::domain::market::{Margin, MarketHours};
use crate::domain::order::{Order, OrderRequest, Side};
use crate::domain::shared::{IdempotencyKey, OrderId, UserId};
use crate::error::LedgerError;
use crate::resilience::RetryPolicy;

use super::adaptive_cache::{ActivityPolicy, AdaptiveCache, CacheRead};
use super::broker_gateway::GatewayError;
use super::idempotency_guard::IdempotencyGuard;
use super::order_ledger::OrderLedger;
use super::reconciliation::{LatestReports, ReconciliationEngine, ReconciliationSummary};

const COMPONENT: &str = "ledger-service";

/// A failed mutation, and whether the broker may have acted on it.
struct Failure {
    error: LedgerError,
    broker_may_have_acted: bool,
}

impl Failure {
    /// Failure of a step that called the broker.
    fn after_broker_call(error: LedgerError) -> Self {
        let broker_may_have_acted =
            matches!(&error, LedgerError::Broker(broker) if broker.is_outcome_uncertain());
        Self {
            error,
            broker_may_have_acted,
        }
    }
}

impl From<LedgerError> for Failure {
    fn from(error: LedgerError) -> Self {
        Self {
            error,
            broker_may_have_acted: false,
        }
    }
}

/// Settings for the ledger service.
#[derive(Debug, Clone)]
pub struct LedgerServiceConfig {
    /// Retry policy for order submission.
    pub submit_retry: RetryPolicy,
    /// Refuse buys whose value exceeds available margin.
    pub enforce_margin_check: bool,
    /// Exchange session used for cache activity tiers.
    pub market_hours: MarketHours,
}

/// Idempotent order placement, cancellation and account reads.
pub struct LedgerService<S, I, K, C, N>
where
    S: LedgerStore,
    I: IdempotencyStore,
    K: CacheStore,
    C: BrokerClient,
    N: InstrumentCatalog,
{
    ledger: Arc<OrderLedger<S, C, N>>,
    guard: IdempotencyGuard<I>,
    cache: AdaptiveCache<K, C>,
    reconciliation: ReconciliationEngine<S, C>,
    config: LedgerServiceConfig,
}

impl<S, I, K, C, N> LedgerService<S, I, K, C, N>
where
    S: LedgerStore,
    I: IdempotencyStore,
    K: CacheStore,
    C: BrokerClient,
    N: InstrumentCatalog,
{
    /// Assemble the service.
    pub const fn new(
        ledger: Arc<OrderLedger<S, C, N>>,
        guard: IdempotencyGuard<I>,
        cache: AdaptiveCache<K, C>,
        reconciliation: ReconciliationEngine<S, C>,
        config: LedgerServiceConfig,
    ) -> Self {
        Self {
            ledger,
            guard,
            cache,
            reconciliation,
            config,
        }
    }

    /// The underlying order ledger.
    #[must_use]
    pub const fn ledger(&self) -> &Arc<OrderLedger<S, C, N>> {
        &self.ledger
    }

    /// Validate, record and submit an order.
    ///
    /// A repeated request with the same key and payload returns the first
    /// response byte-for-byte.
    ///
    /// # Errors
    ///
    /// - `Conflict` for key reuse or an identical request still running.
    /// - `Validation` for bad payloads, unknown instruments or insufficient margin.
    /// - `Broker` for classified submission failures.
    pub async fn place_order(
        &self,
        user_id: &UserId,
        key: &IdempotencyKey,
        payload: &Value,
    ) -> Result<IdempotentResponse, LedgerError> {
        self.guarded(user_id, key, payload, || self.execute_place(user_id, payload))
            .await
    }

    /// Cancel an order.
    ///
    /// # Errors
    ///
    /// - `Conflict` for key reuse or an identical request still running.
    /// - `NotFound`, `InvalidStateTransition` or `Broker` from the ledger.
    pub async fn cancel_order(
        &self,
        user_id: &UserId,
        key: &IdempotencyKey,
        order_id: &OrderId,
    ) -> Result<IdempotentResponse, LedgerError> {
        let payload = json!({ "action": "cancel", "order_id": order_id });
        self.guarded(user_id, key, &payload, || async {
            let order = self
                .ledger
                .cancel_order(order_id, Actor::user(user_id))
                .await
                .map_err(Failure::after_broker_call)?;
            self.cache.invalidate_account(self.ledger.account_id()).await;
            encode(&order).map_err(Failure::from)
        })
        .await
    }

    /// Current state of an order.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn order(&self, order_id: &OrderId) -> Result<OrderResponse, LedgerError> {
        let order = self.ledger.order(order_id).await?;
        Ok(OrderResponse::from(&order))
    }

    /// All orders of the account, oldest first.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn orders(&self) -> Result<Vec<OrderResponse>, LedgerError> {
        Ok(self
            .ledger
            .orders()
            .await?
            .iter()
            .map(OrderResponse::from)
            .collect())
    }

    /// Audit history of an order, oldest first.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn order_history(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<OrderStateHistory>, LedgerError> {
        self.ledger.order(order_id).await?;
        Ok(self.ledger.audit().get_order_history(order_id).await?)
    }

    /// Apply a broker postback.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` if the update implies an illegal move.
    pub async fn handle_broker_postback(
        &self,
        update: &BrokerOrderUpdate,
    ) -> Result<Option<OrderResponse>, LedgerError> {
        let applied = self.ledger.apply_broker_update(update).await?;
        if applied.is_some() {
            self.cache.invalidate_account(self.ledger.account_id()).await;
        }
        Ok(applied.as_ref().map(OrderResponse::from))
    }

    /// Reconcile orders and positions against the broker.
    ///
    /// # Errors
    ///
    /// `ReconciliationAborted` if broker or local data cannot be read.
    pub async fn reconcile(&self) -> Result<ReconciliationSummary, LedgerError> {
        Ok(self.reconciliation.reconcile_all().await?)
    }

    /// Most recent reconciliation reports.
    pub async fn last_reconciliation(&self) -> LatestReports {
        self.reconciliation.latest().await
    }

    /// Current account activity, for cache TTL selection.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn activity_policy(&self) -> Result<ActivityPolicy, LedgerError> {
        let has_open_orders = self.ledger.has_open_orders().await?;
        let has_open_positions = self.ledger.positions().await?.iter().any(|p| p.is_open());
        Ok(ActivityPolicy::at(
            Utc::now(),
            &self.config.market_hours,
            has_open_orders,
            has_open_positions,
        ))
    }

    /// Account margins, cached per `policy`.
    ///
    /// # Errors
    ///
    /// `Broker` when nothing cached can be served.
    pub async fn margins(
        &self,
        policy: &ActivityPolicy,
    ) -> Result<CacheRead<Vec<Margin>>, LedgerError> {
        Ok(self.cache.margins(self.ledger.account_id(), policy).await?)
    }

    /// Broker positions, cached per `policy`.
    ///
    /// # Errors
    ///
    /// `Broker` when nothing cached can be served.
    pub async fn positions(
        &self,
        policy: &ActivityPolicy,
    ) -> Result<CacheRead<Vec<BrokerPosition>>, LedgerError> {
        Ok(self
            .cache
            .positions(self.ledger.account_id(), policy)
            .await?)
    }

    /// Remove expired idempotency records.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn purge_idempotency(&self) -> Result<usize, LedgerError> {
        Ok(self.guard.purge_expired().await?)
    }

    /// One scheduler tick: reconcile, then purge expired idempotency records.
    pub async fn run_maintenance(&self) {
        match self.reconcile().await {
            Ok(summary) => debug!(passed = summary.passed(), "Scheduled reconciliation finished"),
            Err(err) => error!(error = %err, "Scheduled reconciliation aborted"),
        }
        if let Err(err) = self.purge_idempotency().await {
            warn!(error = %err, "Idempotency purge failed");
        }
    }

    async fn guarded<F, Fut>(
        &self,
        user_id: &UserId,
        key: &IdempotencyKey,
        payload: &Value,
        execute: F,
    ) -> Result<IdempotentResponse, LedgerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, Failure>>,
    {
        if let Some(body) = self.guard.check_and_store(key, user_id, payload).await? {
            return Ok(IdempotentResponse {
                body,
                replayed: true,
            });
        }

        match execute().await {
            Ok(body) => {
                // The mutation happened; its result is returned even if it
                // cannot be kept for replay.
                if let Err(err) = self
                    .guard
                    .store_response(key, user_id, payload, body.clone())
                    .await
                {
                    error!(key = %key, error = %err, "Failed to store idempotent response");
                }
                Ok(IdempotentResponse {
                    body,
                    replayed: false,
                })
            }
            Err(Failure {
                error,
                broker_may_have_acted,
            }) => {
                if broker_may_have_acted {
                    warn!(
                        user_id = %user_id,
                        key = %key,
                        error = %error,
                        "Broker outcome unknown, idempotency key stays claimed"
                    );
                } else if let Err(release_err) = self.guard.release(key, user_id).await {
                    warn!(key = %key, error = %release_err, "Failed to release idempotency key");
                }
                Err(error)
            }
        }
    }

    async fn execute_place(&self, user_id: &UserId, payload: &Value) -> Result<Vec<u8>, Failure> {
        let request: OrderRequest = serde_json::from_value(payload.clone())
            .map_err(|err| LedgerError::validation("payload", err.to_string()))?;
        self.ledger.validate_order_payload(&request).await?;
        if self.config.enforce_margin_check {
            self.check_margin(&request).await?;
        }

        let created = self.ledger.create_order(user_id, &request).await?;
        let order = match self
            .ledger
            .submit_with_retry(created.id(), Actor::user(user_id), &self.config.submit_retry)
            .await
        {
            Ok(order) => order,
            Err(LedgerError::Broker(cause))
                if cause.is_retryable() && !cause.is_outcome_uncertain() =>
            {
                // The broker never took the request. The key is released, so
                // a retry places a fresh order and this one must not linger.
                self.abandon(&created, &cause).await;
                return Err(Failure::after_broker_call(LedgerError::Broker(cause)));
            }
            Err(err) => return Err(Failure::after_broker_call(err)),
        };
        self.cache.invalidate_account(self.ledger.account_id()).await;

        info!(
            order_id = %order.id(),
            broker_order_id = ?order.broker_order_id().map(|id| id.as_str()),
            symbol = order.symbol(),
            "Order placed"
        );
        encode(&order).map_err(Failure::from)
    }

    async fn abandon(&self, order: &Order, cause: &GatewayError) {
        if let Err(err) = self
            .ledger
            .abandon_submission(order.id(), Actor::system(COMPONENT), cause)
            .await
        {
            error!(
                order_id = %order.id(),
                error = %err,
                "Failed to abandon unsubmitted order"
            );
        }
    }

    /// Refuse buys whose value exceeds available margin in the segment.
    /// Market orders carry no price and are not checked.
    async fn check_margin(&self, request: &OrderRequest) -> Result<(), LedgerError> {
        if request.side != Side::Buy {
            return Ok(());
        }
        let Some(price) = request.reference_price() else {
            return Ok(());
        };
        let notional: Decimal = price * request.quantity;
        let segment = request.exchange.segment();

        let policy = self.activity_policy().await?;
        let margins = self.margins(&policy).await?;
        let available = margins
            .value
            .iter()
            .find(|m| m.segment == segment)
            .map(|m| m.available)
            .ok_or_else(|| {
                LedgerError::validation("exchange", format!("no {segment} margin available"))
            })?;

        if notional > available {
            return Err(LedgerError::validation(
                "quantity",
                format!("order value {notional} exceeds available {segment} margin {available}"),
            ));
        }
        Ok(())
    }
}

fn encode(order: &Order) -> Result<Vec<u8>, LedgerError> {
    serde_json::to_vec(&OrderResponse::from(order)).map_err(|err| {
        LedgerError::Store(StoreError::Unavailable(format!(
            "response encoding failed: {err}"
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rust_decimal_macros::dec;

    use crate::application::ports::BrokerClientError;
    use crate::application::services::{
        BrokerGateway, CacheTtls, ConflictError, GatewayError, InFlightOrders,
    };
    use crate::domain::order::{Exchange, OrderStatus};
    use crate::domain::shared::AccountId;
    use crate::infrastructure::persistence::{
        InMemoryCacheStore, InMemoryIdempotencyStore, InMemoryInstrumentCatalog,
        InMemoryLedgerStore,
    };
    use crate::testing::{ScriptedBroker, equity_margin, nse_market_hours};

    type Service = LedgerService<
        InMemoryLedgerStore,
        InMemoryIdempotencyStore,
        InMemoryCacheStore,
        ScriptedBroker,
        InMemoryInstrumentCatalog,
    >;

    fn service(broker: Arc<ScriptedBroker>, enforce_margin_check: bool) -> Service {
        let account = AccountId::new("AB1234");
        let store = Arc::new(InMemoryLedgerStore::new());
        let gateway = Arc::new(BrokerGateway::new(broker, Duration::from_secs(1)));
        let in_flight = Arc::new(InFlightOrders::new());
        let ledger = Arc::new(OrderLedger::new(
            account.clone(),
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::new(InMemoryInstrumentCatalog::new([(Exchange::Nse, "INFY")])),
            Arc::clone(&in_flight),
        ));
        LedgerService::new(
            ledger,
            IdempotencyGuard::new(Arc::new(InMemoryIdempotencyStore::new())),
            AdaptiveCache::new(
                Arc::new(InMemoryCacheStore::new()),
                Arc::clone(&gateway),
                CacheTtls::default(),
            ),
            ReconciliationEngine::new(account, store, gateway, in_flight, RetryPolicy::none()),
            LedgerServiceConfig {
                submit_retry: RetryPolicy::none(),
                enforce_margin_check,
                market_hours: nse_market_hours(),
            },
        )
    }

    fn payload(quantity: u32) -> Value {
        json!({
            "tradingsymbol": "INFY",
            "exchange": "NSE",
            "transaction_type": "BUY",
            "quantity": quantity.to_string(),
            "order_type": "LIMIT",
            "product": "CNC",
            "price": "1500"
        })
    }

    #[tokio::test]
    async fn replay_returns_identical_bytes_without_second_submission() {
        let broker = Arc::new(ScriptedBroker::new());
        let svc = service(Arc::clone(&broker), false);
        let user = UserId::new("u1");
        let key = IdempotencyKey::new("req-1");

        let first = svc.place_order(&user, &key, &payload(10)).await.unwrap();
        let second = svc.place_order(&user, &key, &payload(10)).await.unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.body, second.body);
        assert_eq!(broker.place_calls(), 1);
        assert_eq!(first.order().unwrap().status, OrderStatus::Submitted);
    }

    #[tokio::test]
    async fn key_reuse_with_different_payload_conflicts() {
        let svc = service(Arc::new(ScriptedBroker::new()), false);
        let user = UserId::new("u1");
        let key = IdempotencyKey::new("req-1");
        svc.place_order(&user, &key, &payload(10)).await.unwrap();

        let err = svc.place_order(&user, &key, &payload(11)).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::Conflict(ConflictError::KeyReused { key: key.clone() })
        );
    }

    #[tokio::test]
    async fn malformed_payload_is_a_validation_error_and_releases_key() {
        let svc = service(Arc::new(ScriptedBroker::new()), false);
        let user = UserId::new("u1");
        let key = IdempotencyKey::new("req-1");

        let err = svc
            .place_order(&user, &key, &json!({"symbol": "INFY"}))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "payload"));

        let retried = svc.place_order(&user, &key, &payload(10)).await.unwrap();
        assert!(!retried.replayed);
    }

    #[tokio::test]
    async fn rejection_releases_key_but_timeout_keeps_it() {
        let broker = Arc::new(ScriptedBroker::new());
        let svc = service(Arc::clone(&broker), false);
        let user = UserId::new("u1");

        broker.push_place(Err(BrokerClientError::Api {
            status: 400,
            error_type: Some("InputException".into()),
            message: "Invalid price".into(),
        }));
        let rejected = IdempotencyKey::new("rejected");
        svc.place_order(&user, &rejected, &payload(10))
            .await
            .unwrap_err();
        let retry = svc.place_order(&user, &rejected, &payload(10)).await.unwrap();
        assert!(!retry.replayed);

        broker.push_place(Err(BrokerClientError::Timeout));
        let timed_out = IdempotencyKey::new("timed-out");
        let err = svc
            .place_order(&user, &timed_out, &payload(10))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Broker(GatewayError::Timeout));
        let again = svc
            .place_order(&user, &timed_out, &payload(10))
            .await
            .unwrap_err();
        assert!(matches!(
            again,
            LedgerError::Conflict(ConflictError::InProgress { .. })
        ));
    }

    #[tokio::test]
    async fn connection_failure_fails_the_order_so_a_retry_does_not_strand_it() {
        let broker = Arc::new(ScriptedBroker::new());
        let svc = service(Arc::clone(&broker), false);
        let user = UserId::new("u1");
        let key = IdempotencyKey::new("req-1");

        broker.push_place(Err(BrokerClientError::Api {
            status: 503,
            error_type: None,
            message: "unavailable".into(),
        }));
        let err = svc.place_order(&user, &key, &payload(10)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Broker(GatewayError::ConnectionFailure(_))
        ));

        let retry = svc.place_order(&user, &key, &payload(10)).await.unwrap();
        assert!(!retry.replayed);
        assert_eq!(broker.place_calls(), 2);

        let orders = svc.orders().await.unwrap();
        assert_eq!(orders.len(), 2);
        let failed: Vec<_> = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(orders.iter().any(|o| o.status == OrderStatus::Submitted));

        let history = svc.order_history(&failed[0].order_id).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.from_status, Some(OrderStatus::Validated));
        assert_eq!(last.to_status, OrderStatus::Failed);
        assert_eq!(last.context.metadata["error_kind"], "connection_failure");
    }

    #[tokio::test]
    async fn bad_gateway_keeps_the_key_claimed() {
        let broker = Arc::new(ScriptedBroker::new());
        let svc = service(Arc::clone(&broker), false);
        let user = UserId::new("u1");
        let key = IdempotencyKey::new("req-1");

        broker.push_place(Err(BrokerClientError::Api {
            status: 502,
            error_type: None,
            message: "bad gateway".into(),
        }));
        let err = svc.place_order(&user, &key, &payload(10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Broker(GatewayError::UnknownError(_))));

        let again = svc.place_order(&user, &key, &payload(10)).await.unwrap_err();
        assert!(matches!(
            again,
            LedgerError::Conflict(ConflictError::InProgress { .. })
        ));
        assert_eq!(broker.place_calls(), 1);
    }

    #[tokio::test]
    async fn margin_read_timeout_releases_the_key() {
        let broker = Arc::new(ScriptedBroker::new());
        broker.set_margins(Err(BrokerClientError::Timeout));
        let svc = service(Arc::clone(&broker), true);
        let user = UserId::new("u1");
        let key = IdempotencyKey::new("req-1");

        let err = svc.place_order(&user, &key, &payload(1)).await.unwrap_err();
        assert_eq!(err, LedgerError::Broker(GatewayError::Timeout));
        assert_eq!(broker.place_calls(), 0);

        broker.set_margins(Ok(vec![equity_margin(dec!(100000))]));
        let retry = svc.place_order(&user, &key, &payload(1)).await.unwrap();
        assert!(!retry.replayed);
        assert_eq!(broker.place_calls(), 1);
        assert_eq!(svc.orders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn margin_check_refuses_oversized_buys() {
        let broker = Arc::new(ScriptedBroker::new());
        broker.set_margins(Ok(vec![equity_margin(dec!(10000))]));
        let svc = service(Arc::clone(&broker), true);
        let user = UserId::new("u1");

        let err = svc
            .place_order(&user, &IdempotencyKey::new("big"), &payload(10))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "quantity"));
        assert_eq!(broker.place_calls(), 0);

        let ok = svc
            .place_order(&user, &IdempotencyKey::new("small"), &payload(5))
            .await
            .unwrap();
        assert!(!ok.replayed);
    }

    #[tokio::test]
    async fn margin_check_fails_closed_when_broker_is_down() {
        let broker = Arc::new(ScriptedBroker::new());
        broker.set_margins(Err(BrokerClientError::Connect("refused".into())));
        let svc = service(Arc::clone(&broker), true);

        let err = svc
            .place_order(&UserId::new("u1"), &IdempotencyKey::new("k"), &payload(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Broker(GatewayError::ConnectionFailure(_))
        ));
        assert_eq!(broker.place_calls(), 0);
    }

    #[tokio::test]
    async fn history_of_unknown_order_is_not_found() {
        let svc = service(Arc::new(ScriptedBroker::new()), false);
        let err = svc
            .order_history(&OrderId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }
}
