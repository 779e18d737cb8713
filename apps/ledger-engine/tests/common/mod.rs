//! Shared fixtures for ledger integration tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use ledger_engine::application::dto::BrokerOrderUpdate;
use ledger_engine::application::ports::{
    BrokerClient, BrokerClientError, BrokerHolding, BrokerMargin, BrokerOrder, BrokerPosition,
    ModifyOrderParams, PlaceOrderParams, TriggerOrderParams,
};
use ledger_engine::config::{LedgerConfig, load_config_from_string};
use ledger_engine::domain::order::{Exchange, Product, Segment, Side};
use ledger_engine::domain::shared::{BrokerOrderId, TriggerId};
use ledger_engine::infrastructure::config::{Container, ServiceFor};

pub const ACCOUNT: &str = "AB1234";

/// Broker double: scripted placements, static order book, positions and margins.
pub struct FakeBroker {
    delay: Option<Duration>,
    place_results: Mutex<VecDeque<Result<BrokerOrderId, BrokerClientError>>>,
    orders: Mutex<Vec<BrokerOrder>>,
    positions: Mutex<Vec<BrokerPosition>>,
    margins: Mutex<Result<Vec<BrokerMargin>, BrokerClientError>>,
    place_calls: AtomicUsize,
    margins_calls: AtomicUsize,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self {
            delay: None,
            place_results: Mutex::new(VecDeque::new()),
            orders: Mutex::new(Vec::new()),
            positions: Mutex::new(Vec::new()),
            margins: Mutex::new(Ok(Vec::new())),
            place_calls: AtomicUsize::new(0),
            margins_calls: AtomicUsize::new(0),
        }
    }

    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_place(&self, result: Result<BrokerOrderId, BrokerClientError>) {
        self.place_results.lock().unwrap().push_back(result);
    }

    pub fn set_orders(&self, orders: Vec<BrokerOrder>) {
        *self.orders.lock().unwrap() = orders;
    }

    pub fn set_positions(&self, positions: Vec<BrokerPosition>) {
        *self.positions.lock().unwrap() = positions;
    }

    pub fn set_margins(&self, margins: Result<Vec<BrokerMargin>, BrokerClientError>) {
        *self.margins.lock().unwrap() = margins;
    }

    pub fn place_calls(&self) -> usize {
        self.place_calls.load(Ordering::SeqCst)
    }

    pub fn margins_calls(&self) -> usize {
        self.margins_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl BrokerClient for FakeBroker {
    async fn place_order(
        &self,
        _params: &PlaceOrderParams,
    ) -> Result<BrokerOrderId, BrokerClientError> {
        let n = self.place_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;
        let scripted = self.place_results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(BrokerOrderId::new(format!("b-{n}"))))
    }

    async fn modify_order(
        &self,
        order_id: &BrokerOrderId,
        _params: &ModifyOrderParams,
    ) -> Result<BrokerOrderId, BrokerClientError> {
        Ok(order_id.clone())
    }

    async fn cancel_order(
        &self,
        order_id: &BrokerOrderId,
    ) -> Result<BrokerOrderId, BrokerClientError> {
        Ok(order_id.clone())
    }

    async fn place_trigger_order(
        &self,
        _params: &TriggerOrderParams,
    ) -> Result<TriggerId, BrokerClientError> {
        Ok(TriggerId::new("1"))
    }

    async fn cancel_trigger_order(
        &self,
        trigger_id: &TriggerId,
    ) -> Result<TriggerId, BrokerClientError> {
        Ok(trigger_id.clone())
    }

    async fn orders(&self) -> Result<Vec<BrokerOrder>, BrokerClientError> {
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn positions(&self) -> Result<Vec<BrokerPosition>, BrokerClientError> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn holdings(&self) -> Result<Vec<BrokerHolding>, BrokerClientError> {
        Ok(Vec::new())
    }

    async fn margins(&self) -> Result<Vec<BrokerMargin>, BrokerClientError> {
        self.margins_calls.fetch_add(1, Ordering::SeqCst);
        self.margins.lock().unwrap().clone()
    }
}

/// Config for account `AB1234` trading INFY and TCS on NSE, without retries.
pub fn test_config(enforce_margin_check: bool) -> LedgerConfig {
    let yaml = format!(
        r#"
broker:
  account_id: "{ACCOUNT}"
  request_timeout_ms: 1000
retry:
  max_attempts: 0
risk:
  enforce_margin_check: {enforce_margin_check}
instruments:
  - exchange: NSE
    symbol: INFY
  - exchange: NSE
    symbol: TCS
"#
    );
    load_config_from_string(&yaml).unwrap()
}

/// Service wired through the container around `broker`.
pub fn service(broker: Arc<FakeBroker>, enforce_margin_check: bool) -> Arc<ServiceFor<FakeBroker>> {
    Container::with_broker(test_config(enforce_margin_check), broker)
        .unwrap()
        .service()
}

/// NSE CNC limit buy payload.
pub fn limit_buy(symbol: &str, quantity: u32, price: &str) -> Value {
    json!({
        "symbol": symbol,
        "exchange": "NSE",
        "side": "BUY",
        "quantity": quantity,
        "order_type": "LIMIT",
        "product": "CNC",
        "price": price
    })
}

pub fn broker_order(id: &str, status: &str, symbol: &str, quantity: Decimal) -> BrokerOrder {
    BrokerOrder {
        order_id: BrokerOrderId::new(id),
        status: status.to_string(),
        tradingsymbol: symbol.to_string(),
        exchange: Exchange::Nse,
        transaction_type: Side::Buy,
        product: Product::Cnc,
        quantity,
        filled_quantity: Decimal::ZERO,
        average_price: Decimal::ZERO,
        status_message: None,
        tag: None,
    }
}

pub fn postback(broker_order_id: &BrokerOrderId, status: &str) -> BrokerOrderUpdate {
    BrokerOrderUpdate {
        order_id: broker_order_id.clone(),
        status: status.to_string(),
        filled_quantity: Decimal::ZERO,
        average_price: Decimal::ZERO,
        status_message: None,
    }
}

pub fn equity_margin(available: Decimal) -> BrokerMargin {
    BrokerMargin {
        segment: Segment::Equity,
        available,
        used: Decimal::ZERO,
        net: available,
    }
}
