//! Reconciliation Engine
//!
//! Compares the ledger with the broker's view of the same account and
//! reports discrepancies. Runs are report-only: nothing in the ledger is
//! changed. Broker data is fetched first; if it cannot be fetched the run
//! is aborted before anything is compared.

mod error;
mod report;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::application::ports::{BrokerClient, LedgerStore};
use crate::domain::market::PositionKey;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::shared::{AccountId, BrokerOrderId};
use crate::observability::metrics;
use crate::resilience::{RetryPolicy, retry_broker_call};

use super::broker_gateway::BrokerGateway;
use super::in_flight::InFlightOrders;

pub use error::ReconciliationError;
pub use report::{
    LatestReports, OrderDrift, OrderReconciliationReport, PositionDrift,
    PositionReconciliationReport, ReconciliationSummary,
};

/// Diffs local orders and positions against the broker.
pub struct ReconciliationEngine<S: LedgerStore, C: BrokerClient> {
    account_id: AccountId,
    store: Arc<S>,
    gateway: Arc<BrokerGateway<C>>,
    in_flight: Arc<InFlightOrders>,
    retry: RetryPolicy,
    latest: RwLock<LatestReports>,
}

impl<S: LedgerStore, C: BrokerClient> ReconciliationEngine<S, C> {
    /// Create an engine for `account_id`.
    pub fn new(
        account_id: AccountId,
        store: Arc<S>,
        gateway: Arc<BrokerGateway<C>>,
        in_flight: Arc<InFlightOrders>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            account_id,
            store,
            gateway,
            in_flight,
            retry,
            latest: RwLock::new(LatestReports::default()),
        }
    }

    /// Compare local orders with the broker's order book.
    ///
    /// # Errors
    ///
    /// `ReconciliationError` if either side cannot be read.
    pub async fn reconcile_orders(&self) -> Result<OrderReconciliationReport, ReconciliationError> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let broker_orders = retry_broker_call(&self.retry, "orders", || self.gateway.orders())
            .await
            .map_err(|source| ReconciliationError::BrokerFetch {
                what: "orders",
                source,
            })?;
        let local_orders = self
            .store
            .orders_for_account(&self.account_id)
            .await
            .map_err(|source| ReconciliationError::LocalSnapshot {
                what: "orders",
                source,
            })?;

        let local_by_broker_id: HashMap<&BrokerOrderId, &Order> = local_orders
            .iter()
            .filter_map(|o| o.broker_order_id().map(|id| (id, o)))
            .collect();
        let reported: HashSet<&BrokerOrderId> = broker_orders.iter().map(|o| &o.order_id).collect();

        let mut report = OrderReconciliationReport {
            account_id: self.account_id.clone(),
            orders_compared: 0,
            reconciled: 0,
            missing_at_broker: Vec::new(),
            missing_locally: Vec::new(),
            drifted: Vec::new(),
            skipped_in_flight: Vec::new(),
            passed: false,
            started_at,
            completed_at: started_at,
            duration_ms: 0,
        };

        for broker_order in &broker_orders {
            let Some(order) = local_by_broker_id.get(&broker_order.order_id) else {
                report.missing_locally.push(broker_order.order_id.clone());
                continue;
            };
            if self.in_flight.contains(order.id()) {
                report.skipped_in_flight.push(order.id().clone());
                continue;
            }

            report.orders_compared += 1;
            let mut differences = Vec::new();
            match OrderStatus::from_broker(&broker_order.status) {
                None => differences.push(format!("unknown broker status '{}'", broker_order.status)),
                Some(status) if status != order.status() => {
                    differences.push(format!("status {} != {}", order.status(), status));
                }
                Some(_) => {}
            }
            if broker_order.quantity != order.quantity() {
                differences.push(format!(
                    "quantity {} != {}",
                    order.quantity(),
                    broker_order.quantity
                ));
            }

            if differences.is_empty() {
                report.reconciled += 1;
            } else {
                report.drifted.push(OrderDrift {
                    order_id: order.id().clone(),
                    broker_order_id: broker_order.order_id.clone(),
                    local_status: order.status(),
                    broker_status: broker_order.status.clone(),
                    local_quantity: order.quantity(),
                    broker_quantity: broker_order.quantity,
                    differences,
                });
            }
        }

        for order in local_orders.iter().filter(|o| o.status().is_active()) {
            let Some(broker_order_id) = order.broker_order_id() else {
                continue;
            };
            if reported.contains(broker_order_id) {
                continue;
            }
            if self.in_flight.contains(order.id()) {
                report.skipped_in_flight.push(order.id().clone());
            } else {
                report.missing_at_broker.push(order.id().clone());
            }
        }

        report.passed = report.missing_at_broker.is_empty()
            && report.missing_locally.is_empty()
            && report.drifted.is_empty();
        report.completed_at = Utc::now();
        report.duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        if report.passed {
            info!(
                account_id = %self.account_id,
                compared = report.orders_compared,
                skipped = report.skipped_in_flight.len(),
                "Order reconciliation passed"
            );
        } else {
            warn!(
                account_id = %self.account_id,
                compared = report.orders_compared,
                missing_at_broker = report.missing_at_broker.len(),
                missing_locally = report.missing_locally.len(),
                drifted = report.drifted.len(),
                "Order reconciliation found discrepancies"
            );
        }
        metrics::record_reconciliation(
            "orders",
            report.passed,
            report.missing_at_broker.len(),
            report.missing_locally.len(),
            report.drifted.len(),
        );

        self.latest.write().await.orders = Some(report.clone());
        Ok(report)
    }

    /// Compare the local position book with broker net positions.
    ///
    /// Flat positions on either side are ignored.
    ///
    /// # Errors
    ///
    /// `ReconciliationError` if either side cannot be read.
    pub async fn reconcile_positions(
        &self,
    ) -> Result<PositionReconciliationReport, ReconciliationError> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let broker_positions =
            retry_broker_call(&self.retry, "positions", || self.gateway.positions())
                .await
                .map_err(|source| ReconciliationError::BrokerFetch {
                    what: "positions",
                    source,
                })?;
        let local_positions = self
            .store
            .positions(&self.account_id)
            .await
            .map_err(|source| ReconciliationError::LocalSnapshot {
                what: "positions",
                source,
            })?;

        let mut broker: HashMap<PositionKey, Decimal> = HashMap::new();
        for position in broker_positions.iter().filter(|p| !p.quantity.is_zero()) {
            let key = PositionKey::new(&position.tradingsymbol, position.exchange, position.product);
            *broker.entry(key).or_insert(Decimal::ZERO) += position.quantity;
        }
        let local: HashMap<PositionKey, Decimal> = local_positions
            .iter()
            .filter(|p| p.is_open())
            .map(|p| (p.key.clone(), p.quantity))
            .collect();

        let mut report = PositionReconciliationReport {
            account_id: self.account_id.clone(),
            positions_compared: 0,
            reconciled: 0,
            missing_at_broker: Vec::new(),
            missing_locally: Vec::new(),
            drifted: Vec::new(),
            passed: false,
            started_at,
            completed_at: started_at,
            duration_ms: 0,
        };

        for (key, &broker_quantity) in &broker {
            match local.get(key) {
                None => report.missing_locally.push(key.clone()),
                Some(&local_quantity) => {
                    report.positions_compared += 1;
                    if local_quantity == broker_quantity {
                        report.reconciled += 1;
                    } else {
                        report.drifted.push(PositionDrift {
                            key: key.clone(),
                            local_quantity,
                            broker_quantity,
                        });
                    }
                }
            }
        }
        report.missing_at_broker = local
            .keys()
            .filter(|key| !broker.contains_key(*key))
            .cloned()
            .collect();

        report.missing_at_broker.sort();
        report.missing_locally.sort();
        report.drifted.sort_by(|a, b| a.key.cmp(&b.key));
        report.passed = report.missing_at_broker.is_empty()
            && report.missing_locally.is_empty()
            && report.drifted.is_empty();
        report.completed_at = Utc::now();
        report.duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        if report.passed {
            info!(
                account_id = %self.account_id,
                compared = report.positions_compared,
                "Position reconciliation passed"
            );
        } else {
            warn!(
                account_id = %self.account_id,
                missing_at_broker = report.missing_at_broker.len(),
                missing_locally = report.missing_locally.len(),
                drifted = report.drifted.len(),
                "Position reconciliation found discrepancies"
            );
        }
        metrics::record_reconciliation(
            "positions",
            report.passed,
            report.missing_at_broker.len(),
            report.missing_locally.len(),
            report.drifted.len(),
        );

        self.latest.write().await.positions = Some(report.clone());
        Ok(report)
    }

    /// Reconcile orders, then positions.
    ///
    /// # Errors
    ///
    /// The first `ReconciliationError` encountered.
    pub async fn reconcile_all(&self) -> Result<ReconciliationSummary, ReconciliationError> {
        let orders = self.reconcile_orders().await?;
        let positions = self.reconcile_positions().await?;
        Ok(ReconciliationSummary { orders, positions })
    }

    /// Most recent report of each kind.
    pub async fn latest(&self) -> LatestReports {
        self.latest.read().await.clone()
    }
}
