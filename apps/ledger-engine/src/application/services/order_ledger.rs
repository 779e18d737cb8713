//! Order Ledger
//!
//! Owns the order lifecycle:
//!
//! ```text
//! PENDING -> VALIDATED -> SUBMITTED -> OPEN -> COMPLETE | CANCELLED
//!                 |           |    \-> REJECTED -> CANCELLED
//!                 \-> FAILED <-/
//! ```
//!
//! Every status change is committed together with its audit record. A
//! change whose record cannot be written is not applied. Attempts that are
//! refused or fail leave a record too, with the status unchanged on both
//! sides and the intended status under `target`.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::application::dto::BrokerOrderUpdate;
use crate::application::ports::{
    BrokerClient, InstrumentCatalog, LedgerStore, PlaceOrderParams,
};
use crate::domain::audit::{Actor, TransitionContext};
use crate::domain::market::{Position, PositionKey};
use crate::domain::order::{Order, OrderRequest, OrderStateMachine, OrderStatus};
use crate::domain::shared::{AccountId, BrokerOrderId, OrderId, UserId};
use crate::error::LedgerError;
use crate::resilience::{RetryPolicy, retry_broker_call};

use super::audit_trail::AuditTrail;
use super::broker_gateway::{BrokerGateway, GatewayError};
use super::in_flight::InFlightOrders;

const COMPONENT: &str = "order-ledger";
const POSTBACK_SOURCE: &str = "broker-postback";

/// Order lifecycle service for one trading account.
pub struct OrderLedger<S, C, N>
where
    S: LedgerStore,
    C: BrokerClient,
    N: InstrumentCatalog,
{
    account_id: AccountId,
    store: Arc<S>,
    audit: AuditTrail<S>,
    gateway: Arc<BrokerGateway<C>>,
    catalog: Arc<N>,
    in_flight: Arc<InFlightOrders>,
}

impl<S, C, N> OrderLedger<S, C, N>
where
    S: LedgerStore,
    C: BrokerClient,
    N: InstrumentCatalog,
{
    /// Create a ledger for `account_id`.
    pub fn new(
        account_id: AccountId,
        store: Arc<S>,
        gateway: Arc<BrokerGateway<C>>,
        catalog: Arc<N>,
        in_flight: Arc<InFlightOrders>,
    ) -> Self {
        Self {
            account_id,
            audit: AuditTrail::new(Arc::clone(&store)),
            store,
            gateway,
            catalog,
            in_flight,
        }
    }

    /// Account this ledger trades for.
    #[must_use]
    pub const fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// Audit trail over the ledger's store.
    #[must_use]
    pub const fn audit(&self) -> &AuditTrail<S> {
        &self.audit
    }

    /// Shared in-flight set.
    #[must_use]
    pub const fn in_flight(&self) -> &Arc<InFlightOrders> {
        &self.in_flight
    }

    /// Whether `order_id` has a mutation in progress.
    #[must_use]
    pub fn is_in_flight(&self, order_id: &OrderId) -> bool {
        self.in_flight.contains(order_id)
    }

    /// Reject malformed requests and unknown instruments before anything is persisted.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` naming the offending field.
    pub async fn validate_order_payload(&self, request: &OrderRequest) -> Result<(), LedgerError> {
        request.validate()?;
        if !self
            .catalog
            .is_known(request.exchange, &request.symbol)
            .await
        {
            return Err(LedgerError::validation(
                "symbol",
                format!(
                    "unknown instrument {}:{}",
                    request.exchange,
                    request.symbol.trim().to_ascii_uppercase()
                ),
            ));
        }
        Ok(())
    }

    /// Validate and persist a new order, leaving it `VALIDATED`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` for bad requests, or a store error.
    pub async fn create_order(
        &self,
        user_id: &UserId,
        request: &OrderRequest,
    ) -> Result<Order, LedgerError> {
        self.validate_order_payload(request).await?;

        let mut order = Order::new(user_id.clone(), self.account_id.clone(), request)?;
        self.audit
            .record_creation(&order, Actor::user(user_id), TransitionContext::default())
            .await?;

        order.transition_to(OrderStatus::Validated)?;
        self.audit
            .record_transition(
                &order,
                OrderStatus::Pending,
                Actor::system(COMPONENT),
                TransitionContext::reason("payload validated"),
            )
            .await?;

        Ok(order)
    }

    /// Submit a `VALIDATED` order once, without retries.
    ///
    /// # Errors
    ///
    /// See [`Self::submit_with_retry`].
    pub async fn submit_order_to_broker(
        &self,
        order_id: &OrderId,
        actor: Actor,
    ) -> Result<Order, LedgerError> {
        self.submit_with_retry(order_id, actor, &RetryPolicy::none())
            .await
    }

    /// Submit a `VALIDATED` order, retrying recoverable broker failures per `policy`.
    ///
    /// On success the order is `SUBMITTED` with the broker's id. A
    /// recoverable failure that outlasts the policy leaves the order
    /// `VALIDATED`. A fatal failure moves it to `FAILED`.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` if the order is not `VALIDATED`.
    /// - `Conflict` if the order is already being mutated.
    /// - `Broker` with the classified failure.
    pub async fn submit_with_retry(
        &self,
        order_id: &OrderId,
        actor: Actor,
        policy: &RetryPolicy,
    ) -> Result<Order, LedgerError> {
        let _guard = self.in_flight.acquire(order_id)?;
        let mut order = self.order(order_id).await?;
        if let Err(err) = OrderStateMachine::validate_transition(order.status(), OrderStatus::Submitted) {
            self.record_refused_change(
                &order,
                OrderStatus::Submitted,
                actor,
                err.to_string(),
                "invalid_state_transition",
            )
            .await;
            return Err(err.into());
        }

        let params = PlaceOrderParams::from(&order);
        let outcome = retry_broker_call(policy, "place_order", || {
            self.gateway.place_order(&params)
        })
        .await;

        match outcome {
            Ok(broker_order_id) => {
                order.mark_submitted(broker_order_id.clone())?;
                self.audit
                    .record_transition(
                        &order,
                        OrderStatus::Validated,
                        actor,
                        TransitionContext::reason("accepted by broker")
                            .with("broker_order_id", broker_order_id.as_str()),
                    )
                    .await?;
                Ok(order)
            }
            Err(err) if err.is_retryable() => {
                warn!(
                    order_id = %order_id,
                    kind = err.kind(),
                    error = %err,
                    "Submission failed recoverably, order stays VALIDATED"
                );
                self.record_refused_change(
                    &order,
                    OrderStatus::Submitted,
                    actor,
                    format!("submission failed: {err}"),
                    err.kind(),
                )
                .await;
                Err(err.into())
            }
            Err(err) => {
                error!(
                    order_id = %order_id,
                    kind = err.kind(),
                    error = %err,
                    "Submission failed, marking order FAILED"
                );
                let reason = err.to_string();
                order.mark_failed(reason.clone())?;
                self.audit
                    .record_transition(
                        &order,
                        OrderStatus::Validated,
                        actor,
                        TransitionContext::reason(reason).with("error_kind", err.kind()),
                    )
                    .await?;
                Err(err.into())
            }
        }
    }

    /// Give up on a `VALIDATED` order whose submission kept failing recoverably.
    ///
    /// The order moves to `FAILED` with `cause` as its reason, so a later
    /// request for the same trade does not leave it behind unsubmitted.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` if the order is no longer `VALIDATED`.
    /// - `Conflict` if the order is already being mutated.
    pub async fn abandon_submission(
        &self,
        order_id: &OrderId,
        actor: Actor,
        cause: &GatewayError,
    ) -> Result<Order, LedgerError> {
        let _guard = self.in_flight.acquire(order_id)?;
        let mut order = self.order(order_id).await?;
        if order.status() != OrderStatus::Validated {
            return Err(LedgerError::InvalidStateTransition {
                from: order.status(),
                to: OrderStatus::Failed,
                reason: "only unsubmitted orders can be abandoned".to_string(),
            });
        }

        let reason = format!("submission abandoned: {cause}");
        order.mark_failed(reason.clone())?;
        self.audit
            .record_transition(
                &order,
                OrderStatus::Validated,
                actor,
                TransitionContext::reason(reason).with("error_kind", cause.kind()),
            )
            .await?;
        warn!(order_id = %order_id, kind = cause.kind(), "Submission abandoned, order FAILED");
        Ok(order)
    }

    /// Cancel an order.
    ///
    /// `OPEN` orders are cancelled at the broker first. `REJECTED` orders
    /// are closed out locally.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` from any other status.
    /// - `Broker` if the broker refuses the cancel; the order is unchanged.
    pub async fn cancel_order(&self, order_id: &OrderId, actor: Actor) -> Result<Order, LedgerError> {
        let _guard = self.in_flight.acquire(order_id)?;
        let mut order = self.order(order_id).await?;
        let from = order.status();
        if let Err(err) = OrderStateMachine::validate_transition(from, OrderStatus::Cancelled) {
            self.record_refused_change(
                &order,
                OrderStatus::Cancelled,
                actor,
                err.to_string(),
                "invalid_state_transition",
            )
            .await;
            return Err(err.into());
        }

        let context = match (from, order.broker_order_id().cloned()) {
            (OrderStatus::Open, Some(broker_order_id)) => {
                if let Err(err) = self.gateway.cancel_order(&broker_order_id).await {
                    self.record_refused_change(
                        &order,
                        OrderStatus::Cancelled,
                        actor,
                        format!("cancel failed: {err}"),
                        err.kind(),
                    )
                    .await;
                    return Err(err.into());
                }
                TransitionContext::reason("cancelled at broker")
                    .with("broker_order_id", broker_order_id.as_str())
            }
            _ => TransitionContext::reason("rejected order closed"),
        };

        order.transition_to(OrderStatus::Cancelled)?;
        self.audit
            .record_transition(&order, from, actor, context)
            .await?;
        Ok(order)
    }

    /// Apply a broker status update to the order it names.
    ///
    /// Returns `None` when the update is ignored: unknown broker order or
    /// unmapped status. `SUBMITTED` orders reported `COMPLETE` or
    /// `CANCELLED` are walked through `OPEN`. A `COMPLETE` update folds the
    /// fill into the local position.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` if the update implies an illegal move; the
    /// order is left as it was.
    pub async fn apply_broker_update(
        &self,
        update: &BrokerOrderUpdate,
    ) -> Result<Option<Order>, LedgerError> {
        let Some(found) = self.store.find_by_broker_id(&update.order_id).await? else {
            warn!(broker_order_id = %update.order_id, "Update for unknown broker order ignored");
            return Ok(None);
        };
        let Some(target) = OrderStatus::from_broker(&update.status) else {
            warn!(
                order_id = %found.id(),
                raw_status = %update.status,
                "Unmapped broker status ignored"
            );
            return Ok(None);
        };

        let _guard = self.in_flight.acquire(found.id())?;
        // Reload under the guard; the snapshot above may be stale.
        let mut order = self.order(found.id()).await?;
        if order.status() == target {
            return Ok(Some(order));
        }

        let path: &[OrderStatus] = match (order.status(), target) {
            (OrderStatus::Submitted, OrderStatus::Complete) => {
                &[OrderStatus::Open, OrderStatus::Complete]
            }
            (OrderStatus::Submitted, OrderStatus::Cancelled) => {
                &[OrderStatus::Open, OrderStatus::Cancelled]
            }
            _ => std::slice::from_ref(&target),
        };
        let mut walked = order.status();
        for &step in path {
            if let Err(err) = OrderStateMachine::validate_transition(walked, step) {
                warn!(
                    order_id = %order.id(),
                    raw_status = %update.status,
                    error = %err,
                    "Broker update implies an illegal transition"
                );
                self.record_refused_change(
                    &order,
                    target,
                    Actor::broker_callback(POSTBACK_SOURCE),
                    format!("broker status {} refused: {err}", update.status),
                    "invalid_state_transition",
                )
                .await;
                return Err(err.into());
            }
            walked = step;
        }

        for &step in path {
            let from = order.status();
            order.transition_to(step)?;
            order.set_status_message(update.status_message.clone());
            self.audit
                .record_transition(
                    &order,
                    from,
                    Actor::broker_callback(POSTBACK_SOURCE),
                    TransitionContext::reason(format!("broker status {}", update.status))
                        .with("broker_order_id", update.order_id.as_str())
                        .with("filled_quantity", update.filled_quantity.to_string()),
                )
                .await?;
        }

        if order.status() == OrderStatus::Complete {
            self.fold_fill(&order, update.filled_quantity, update.average_price)
                .await?;
        }
        Ok(Some(order))
    }

    /// Load an order.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is unknown.
    pub async fn order(&self, order_id: &OrderId) -> Result<Order, LedgerError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(order_id.clone()))
    }

    /// Look up an order by broker id.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn order_by_broker_id(
        &self,
        broker_order_id: &BrokerOrderId,
    ) -> Result<Option<Order>, LedgerError> {
        Ok(self.store.find_by_broker_id(broker_order_id).await?)
    }

    /// All orders of the account, oldest first.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn orders(&self) -> Result<Vec<Order>, LedgerError> {
        Ok(self.store.orders_for_account(&self.account_id).await?)
    }

    /// Whether any order is live at the broker.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn has_open_orders(&self) -> Result<bool, LedgerError> {
        Ok(self
            .orders()
            .await?
            .iter()
            .any(|o| o.status().is_active()))
    }

    /// Local position book.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn positions(&self) -> Result<Vec<Position>, LedgerError> {
        Ok(self.store.positions(&self.account_id).await?)
    }

    /// Audit a change that was attempted but not applied.
    ///
    /// A record that cannot be written is logged; the caller reports its own
    /// error either way.
    async fn record_refused_change(
        &self,
        order: &Order,
        target: OrderStatus,
        actor: Actor,
        reason: String,
        error_kind: &str,
    ) {
        let status = order.status();
        let metadata = [
            ("error_kind".to_string(), Value::from(error_kind)),
            ("target".to_string(), Value::from(target.as_str())),
        ];
        if let Err(err) = self
            .audit
            .log_state_change(order.id(), Some(status), status, actor, Some(reason), metadata)
            .await
        {
            error!(
                order_id = %order.id(),
                target = %target,
                error = %err,
                "Failed to audit refused status change"
            );
        }
    }

    async fn fold_fill(
        &self,
        order: &Order,
        filled_quantity: Decimal,
        average_price: Decimal,
    ) -> Result<(), LedgerError> {
        let quantity = if filled_quantity > Decimal::ZERO {
            filled_quantity
        } else {
            order.quantity()
        };
        let price = if average_price > Decimal::ZERO {
            average_price
        } else {
            order.price().unwrap_or(Decimal::ZERO)
        };

        let key = PositionKey::new(order.symbol(), order.exchange(), order.product());
        let mut position = self
            .store
            .positions(&self.account_id)
            .await?
            .into_iter()
            .find(|p| p.key == key)
            .unwrap_or_else(|| Position::flat(self.account_id.clone(), key));
        position.apply_fill(order.side(), quantity, price);
        self.store.upsert_position(&position).await?;

        info!(
            order_id = %order.id(),
            position = %position.key,
            quantity = %position.quantity,
            "Fill applied to position"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::application::ports::{BrokerClientError, StoreError};
    use crate::application::services::GatewayError;
    use crate::domain::audit::{ActorKind, OrderStateHistory, StateChange};
    use crate::domain::order::{Exchange, Side};
    use crate::infrastructure::persistence::{InMemoryInstrumentCatalog, InMemoryLedgerStore};
    use crate::testing::{OrderRequestBuilder, ScriptedBroker};

    type Ledger<S> = OrderLedger<S, ScriptedBroker, InMemoryInstrumentCatalog>;

    fn catalog() -> Arc<InMemoryInstrumentCatalog> {
        Arc::new(InMemoryInstrumentCatalog::new([
            (Exchange::Nse, "INFY"),
            (Exchange::Nse, "TCS"),
        ]))
    }

    fn ledger_with<S: LedgerStore>(store: Arc<S>, broker: Arc<ScriptedBroker>) -> Ledger<S> {
        OrderLedger::new(
            AccountId::new("AB1234"),
            store,
            Arc::new(BrokerGateway::new(broker, Duration::from_secs(1))),
            catalog(),
            Arc::new(InFlightOrders::new()),
        )
    }

    fn setup() -> (
        Ledger<InMemoryLedgerStore>,
        Arc<InMemoryLedgerStore>,
        Arc<ScriptedBroker>,
    ) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let broker = Arc::new(ScriptedBroker::new());
        (
            ledger_with(Arc::clone(&store), Arc::clone(&broker)),
            store,
            broker,
        )
    }

    fn user() -> UserId {
        UserId::new("user-1")
    }

    fn update(broker_id: &str, status: &str) -> BrokerOrderUpdate {
        BrokerOrderUpdate {
            order_id: BrokerOrderId::new(broker_id),
            status: status.to_string(),
            filled_quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            status_message: None,
        }
    }

    fn statuses(history: &[OrderStateHistory]) -> Vec<OrderStatus> {
        history.iter().map(|h| h.to_status).collect()
    }

    #[tokio::test]
    async fn create_order_persists_pending_then_validated() {
        let (ledger, _, _) = setup();
        let order = ledger
            .create_order(&user(), &OrderRequestBuilder::new().build())
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Validated);
        let history = ledger.audit().get_order_history(order.id()).await.unwrap();
        assert_eq!(
            statuses(&history),
            vec![OrderStatus::Pending, OrderStatus::Validated]
        );
        assert_eq!(history[0].actor.kind, ActorKind::User);
    }

    #[tokio::test]
    async fn unknown_instrument_is_rejected_before_persistence() {
        let (ledger, store, _) = setup();
        let err = ledger
            .create_order(&user(), &OrderRequestBuilder::new().symbol("NOPE").build())
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "symbol"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn non_positive_quantity_is_rejected() {
        let (ledger, store, _) = setup();
        let err = ledger
            .create_order(
                &user(),
                &OrderRequestBuilder::new().quantity(dec!(0)).build(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "quantity"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn successful_submission_attaches_broker_id() {
        let (ledger, _, broker) = setup();
        let order = ledger
            .create_order(&user(), &OrderRequestBuilder::new().build())
            .await
            .unwrap();

        let submitted = ledger
            .submit_order_to_broker(order.id(), Actor::user(&user()))
            .await
            .unwrap();

        assert_eq!(submitted.status(), OrderStatus::Submitted);
        assert_eq!(submitted.broker_order_id(), Some(&BrokerOrderId::new("b-1")));
        assert_eq!(broker.place_calls(), 1);
        assert!(!ledger.is_in_flight(order.id()));
    }

    #[tokio::test]
    async fn recoverable_failure_leaves_order_validated() {
        let (ledger, _, broker) = setup();
        broker.push_place(Err(BrokerClientError::Connect("refused".into())));
        let order = ledger
            .create_order(&user(), &OrderRequestBuilder::new().build())
            .await
            .unwrap();

        let err = ledger
            .submit_order_to_broker(order.id(), Actor::user(&user()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Broker(GatewayError::ConnectionFailure(_))
        ));
        let stored = ledger.order(order.id()).await.unwrap();
        assert_eq!(stored.status(), OrderStatus::Validated);
        let history = ledger.audit().get_order_history(order.id()).await.unwrap();
        assert_eq!(history.len(), 3);
        let attempt = history.last().unwrap();
        assert_eq!(attempt.from_status, Some(OrderStatus::Validated));
        assert_eq!(attempt.to_status, OrderStatus::Validated);
        assert_eq!(attempt.context.metadata["error_kind"], "connection_failure");
        assert_eq!(attempt.context.metadata["target"], "SUBMITTED");
        assert_eq!(attempt.actor.kind, ActorKind::User);
    }

    #[tokio::test]
    async fn abandoned_submission_fails_the_order_with_history() {
        let (ledger, _, broker) = setup();
        broker.push_place(Err(BrokerClientError::Connect("refused".into())));
        let order = ledger
            .create_order(&user(), &OrderRequestBuilder::new().build())
            .await
            .unwrap();
        let err = ledger
            .submit_order_to_broker(order.id(), Actor::user(&user()))
            .await
            .unwrap_err();
        let LedgerError::Broker(cause) = err else {
            panic!("expected broker error, got {err:?}");
        };

        let failed = ledger
            .abandon_submission(order.id(), Actor::system("test"), &cause)
            .await
            .unwrap();

        assert_eq!(failed.status(), OrderStatus::Failed);
        assert!(failed.status_message().unwrap().contains("refused"));
        let history = ledger.audit().get_order_history(order.id()).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.from_status, Some(OrderStatus::Validated));
        assert_eq!(last.to_status, OrderStatus::Failed);
        assert_eq!(last.context.metadata["error_kind"], "connection_failure");

        let again = ledger
            .abandon_submission(order.id(), Actor::system("test"), &cause)
            .await
            .unwrap_err();
        assert!(matches!(
            again,
            LedgerError::InvalidStateTransition {
                from: OrderStatus::Failed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn fatal_rejection_fails_order_with_broker_message() {
        let (ledger, _, broker) = setup();
        broker.push_place(Err(BrokerClientError::Api {
            status: 400,
            error_type: Some("InputException".into()),
            message: "Tick size for this script is 0.05".into(),
        }));
        let order = ledger
            .create_order(&user(), &OrderRequestBuilder::new().build())
            .await
            .unwrap();

        let err = ledger
            .submit_order_to_broker(order.id(), Actor::user(&user()))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::Broker(GatewayError::BrokerRejected {
                message: "Tick size for this script is 0.05".into()
            })
        );
        let stored = ledger.order(order.id()).await.unwrap();
        assert_eq!(stored.status(), OrderStatus::Failed);
        assert!(
            stored
                .status_message()
                .unwrap()
                .contains("Tick size for this script is 0.05")
        );
        let history = ledger.audit().get_order_history(order.id()).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.to_status, OrderStatus::Failed);
        assert_eq!(last.context.metadata["error_kind"], "broker_rejected");
    }

    #[tokio::test]
    async fn submitting_twice_is_an_invalid_transition() {
        let (ledger, _, broker) = setup();
        let order = ledger
            .create_order(&user(), &OrderRequestBuilder::new().build())
            .await
            .unwrap();
        ledger
            .submit_order_to_broker(order.id(), Actor::user(&user()))
            .await
            .unwrap();

        let err = ledger
            .submit_order_to_broker(order.id(), Actor::user(&user()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LedgerError::InvalidStateTransition {
                from: OrderStatus::Submitted,
                ..
            }
        ));
        assert_eq!(broker.place_calls(), 1);
    }

    #[tokio::test]
    async fn retry_policy_rides_out_connection_failures() {
        let (ledger, _, broker) = setup();
        broker.push_place(Err(BrokerClientError::Connect("reset".into())));
        broker.push_place(Err(BrokerClientError::Timeout));
        let order = ledger
            .create_order(&user(), &OrderRequestBuilder::new().build())
            .await
            .unwrap();

        let submitted = ledger
            .submit_with_retry(
                order.id(),
                Actor::system("test"),
                &RetryPolicy::fixed(3, Duration::from_millis(1)),
            )
            .await
            .unwrap();

        assert_eq!(submitted.status(), OrderStatus::Submitted);
        assert_eq!(broker.place_calls(), 3);
    }

    async fn submitted_order(ledger: &Ledger<InMemoryLedgerStore>) -> Order {
        let order = ledger
            .create_order(&user(), &OrderRequestBuilder::new().build())
            .await
            .unwrap();
        ledger
            .submit_order_to_broker(order.id(), Actor::user(&user()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_order_is_cancelled_at_broker() {
        let (ledger, _, broker) = setup();
        let order = submitted_order(&ledger).await;
        ledger.apply_broker_update(&update("b-1", "OPEN")).await.unwrap();

        let cancelled = ledger
            .cancel_order(order.id(), Actor::user(&user()))
            .await
            .unwrap();

        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(broker.cancel_calls(), 1);
    }

    #[tokio::test]
    async fn rejected_order_is_closed_locally() {
        let (ledger, _, broker) = setup();
        let order = submitted_order(&ledger).await;
        ledger
            .apply_broker_update(&update("b-1", "REJECTED"))
            .await
            .unwrap();

        let cancelled = ledger
            .cancel_order(order.id(), Actor::user(&user()))
            .await
            .unwrap();

        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(broker.cancel_calls(), 0);
    }

    #[tokio::test]
    async fn cancelling_a_validated_order_is_refused() {
        let (ledger, _, broker) = setup();
        let order = ledger
            .create_order(&user(), &OrderRequestBuilder::new().build())
            .await
            .unwrap();

        let err = ledger
            .cancel_order(order.id(), Actor::user(&user()))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InvalidStateTransition { .. }));
        assert_eq!(broker.cancel_calls(), 0);
        let history = ledger.audit().get_order_history(order.id()).await.unwrap();
        let attempt = history.last().unwrap();
        assert_eq!(attempt.to_status, OrderStatus::Validated);
        assert_eq!(attempt.context.metadata["target"], "CANCELLED");
        assert_eq!(
            attempt.context.metadata["error_kind"],
            "invalid_state_transition"
        );
    }

    #[tokio::test]
    async fn broker_refusing_cancel_leaves_order_open() {
        let (ledger, _, broker) = setup();
        let order = submitted_order(&ledger).await;
        ledger.apply_broker_update(&update("b-1", "OPEN")).await.unwrap();
        broker.push_cancel(Err(BrokerClientError::Api {
            status: 400,
            error_type: Some("OrderException".into()),
            message: "Order cannot be cancelled as it is being processed".into(),
        }));

        let err = ledger
            .cancel_order(order.id(), Actor::user(&user()))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Broker(GatewayError::BrokerRejected { .. })));
        assert_eq!(
            ledger.order(order.id()).await.unwrap().status(),
            OrderStatus::Open
        );
        let history = ledger.audit().get_order_history(order.id()).await.unwrap();
        let attempt = history.last().unwrap();
        assert_eq!(attempt.from_status, Some(OrderStatus::Open));
        assert_eq!(attempt.to_status, OrderStatus::Open);
        assert_eq!(attempt.context.metadata["error_kind"], "broker_rejected");
        assert!(
            attempt
                .context
                .reason
                .as_deref()
                .unwrap()
                .contains("being processed")
        );
    }

    #[tokio::test]
    async fn completion_walks_through_open_and_books_the_fill() {
        let (ledger, _, _) = setup();
        let order = submitted_order(&ledger).await;
        let mut fill = update("b-1", "COMPLETE");
        fill.filled_quantity = dec!(10);
        fill.average_price = dec!(1499.5);

        let completed = ledger.apply_broker_update(&fill).await.unwrap().unwrap();

        assert_eq!(completed.status(), OrderStatus::Complete);
        let history = ledger.audit().get_order_history(order.id()).await.unwrap();
        assert_eq!(
            statuses(&history),
            vec![
                OrderStatus::Pending,
                OrderStatus::Validated,
                OrderStatus::Submitted,
                OrderStatus::Open,
                OrderStatus::Complete,
            ]
        );
        assert!(
            history[3..]
                .iter()
                .all(|h| h.actor.kind == ActorKind::BrokerCallback)
        );

        let positions = ledger.positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, dec!(10));
        assert_eq!(positions[0].average_price, dec!(1499.5));
    }

    #[tokio::test]
    async fn sell_fill_reduces_position() {
        let (ledger, _, _) = setup();
        submitted_order(&ledger).await;
        ledger
            .apply_broker_update(&update("b-1", "COMPLETE"))
            .await
            .unwrap();

        let sell = ledger
            .create_order(
                &user(),
                &OrderRequestBuilder::new()
                    .side(Side::Sell)
                    .quantity(dec!(4))
                    .build(),
            )
            .await
            .unwrap();
        ledger
            .submit_order_to_broker(sell.id(), Actor::user(&user()))
            .await
            .unwrap();
        ledger
            .apply_broker_update(&update("b-2", "COMPLETE"))
            .await
            .unwrap();

        let positions = ledger.positions().await.unwrap();
        assert_eq!(positions[0].quantity, dec!(6));
    }

    #[tokio::test]
    async fn unknown_updates_are_ignored() {
        let (ledger, _, _) = setup();
        let order = submitted_order(&ledger).await;

        assert_eq!(
            ledger.apply_broker_update(&update("b-404", "OPEN")).await.unwrap(),
            None
        );
        assert_eq!(
            ledger
                .apply_broker_update(&update("b-1", "SOMETHING NEW"))
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            ledger.order(order.id()).await.unwrap().status(),
            OrderStatus::Submitted
        );
    }

    #[tokio::test]
    async fn backwards_update_is_refused() {
        let (ledger, _, _) = setup();
        let order = submitted_order(&ledger).await;
        ledger
            .apply_broker_update(&update("b-1", "COMPLETE"))
            .await
            .unwrap();

        let err = ledger
            .apply_broker_update(&update("b-1", "OPEN"))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InvalidStateTransition { .. }));
        assert_eq!(
            ledger.order(order.id()).await.unwrap().status(),
            OrderStatus::Complete
        );
        let history = ledger.audit().get_order_history(order.id()).await.unwrap();
        let attempt = history.last().unwrap();
        assert_eq!(attempt.from_status, Some(OrderStatus::Complete));
        assert_eq!(attempt.to_status, OrderStatus::Complete);
        assert_eq!(attempt.actor.kind, ActorKind::BrokerCallback);
        assert_eq!(attempt.context.metadata["target"], "OPEN");
    }

    /// Store whose transition commits fail on demand.
    struct FlakyAuditStore {
        inner: InMemoryLedgerStore,
        fail_commits: AtomicBool,
    }

    #[async_trait]
    impl LedgerStore for FlakyAuditStore {
        async fn insert_order(
            &self,
            order: &Order,
            creation: StateChange,
        ) -> Result<OrderStateHistory, StoreError> {
            self.inner.insert_order(order, creation).await
        }

        async fn commit_transition(
            &self,
            order: &Order,
            expected_from: OrderStatus,
            change: StateChange,
        ) -> Result<OrderStateHistory, StoreError> {
            if self.fail_commits.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("audit table unavailable".into()));
            }
            self.inner
                .commit_transition(order, expected_from, change)
                .await
        }

        async fn append_history(
            &self,
            change: StateChange,
        ) -> Result<OrderStateHistory, StoreError> {
            self.inner.append_history(change).await
        }

        async fn get_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.get_order(id).await
        }

        async fn find_by_broker_id(
            &self,
            broker_order_id: &BrokerOrderId,
        ) -> Result<Option<Order>, StoreError> {
            self.inner.find_by_broker_id(broker_order_id).await
        }

        async fn orders_for_account(
            &self,
            account_id: &AccountId,
        ) -> Result<Vec<Order>, StoreError> {
            self.inner.orders_for_account(account_id).await
        }

        async fn history(
            &self,
            order_id: &OrderId,
        ) -> Result<Vec<OrderStateHistory>, StoreError> {
            self.inner.history(order_id).await
        }

        async fn positions(&self, account_id: &AccountId) -> Result<Vec<Position>, StoreError> {
            self.inner.positions(account_id).await
        }

        async fn upsert_position(&self, position: &Position) -> Result<(), StoreError> {
            self.inner.upsert_position(position).await
        }
    }

    #[tokio::test]
    async fn failed_audit_write_leaves_status_unchanged() {
        let store = Arc::new(FlakyAuditStore {
            inner: InMemoryLedgerStore::new(),
            fail_commits: AtomicBool::new(false),
        });
        let ledger = ledger_with(Arc::clone(&store), Arc::new(ScriptedBroker::new()));
        let order = ledger
            .create_order(&user(), &OrderRequestBuilder::new().build())
            .await
            .unwrap();

        store.fail_commits.store(true, Ordering::SeqCst);
        let err = ledger
            .submit_order_to_broker(order.id(), Actor::user(&user()))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Store(StoreError::Unavailable(_))));
        let stored = ledger.order(order.id()).await.unwrap();
        assert_eq!(stored.status(), OrderStatus::Validated);
        assert_eq!(stored.broker_order_id(), None);
        assert_eq!(
            ledger.audit().get_order_history(order.id()).await.unwrap().len(),
            2
        );
    }
}
