//! Typed fixtures shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, NaiveTime, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::application::ports::{
    BrokerClient, BrokerClientError, BrokerHolding, BrokerMargin, BrokerOrder, BrokerPosition,
    ModifyOrderParams, PlaceOrderParams, TriggerOrderParams,
};
use crate::domain::market::MarketHours;
use crate::domain::order::{Exchange, OrderRequest, OrderType, Product, Segment, Side};
use crate::domain::shared::{BrokerOrderId, TriggerId};

/// Builder for order requests, defaulting to a valid NSE limit buy of INFY.
pub struct OrderRequestBuilder {
    request: OrderRequest,
}

impl OrderRequestBuilder {
    pub fn new() -> Self {
        Self {
            request: OrderRequest {
                symbol: "INFY".to_string(),
                exchange: Exchange::Nse,
                side: Side::Buy,
                quantity: dec!(10),
                order_type: OrderType::Limit,
                product: Product::Cnc,
                price: Some(dec!(1500)),
                trigger_price: None,
            },
        }
    }

    pub fn symbol(mut self, symbol: &str) -> Self {
        self.request.symbol = symbol.to_string();
        self
    }

    pub const fn side(mut self, side: Side) -> Self {
        self.request.side = side;
        self
    }

    pub const fn quantity(mut self, quantity: Decimal) -> Self {
        self.request.quantity = quantity;
        self
    }

    pub const fn market(mut self) -> Self {
        self.request.order_type = OrderType::Market;
        self.request.price = None;
        self
    }

    pub const fn price(mut self, price: Option<Decimal>) -> Self {
        self.request.price = price;
        self
    }

    pub fn build(self) -> OrderRequest {
        self.request
    }
}

pub fn place_params() -> PlaceOrderParams {
    let request = OrderRequestBuilder::new().build();
    PlaceOrderParams {
        exchange: request.exchange,
        tradingsymbol: request.symbol,
        transaction_type: request.side,
        quantity: request.quantity,
        order_type: request.order_type,
        product: request.product,
        price: request.price,
        trigger_price: request.trigger_price,
        tag: None,
    }
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

pub fn equity_margin(available: Decimal) -> BrokerMargin {
    BrokerMargin {
        segment: Segment::Equity,
        available,
        used: Decimal::ZERO,
        net: available,
    }
}

/// NSE session: 09:15-15:30 IST, Monday to Friday, Republic Day 2026 off.
pub fn nse_market_hours() -> MarketHours {
    MarketHours {
        open: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
        close: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
        utc_offset: FixedOffset::east_opt(330 * 60).unwrap(),
        trading_days: vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ],
        holidays: vec![NaiveDate::from_ymd_opt(2026, 1, 26).unwrap()],
    }
}

/// Broker double with scripted responses and call counters.
///
/// Unscripted `place_order` calls succeed with ids `b-1`, `b-2`, ...
pub struct ScriptedBroker {
    delay: Option<Duration>,
    place_results: Mutex<VecDeque<Result<BrokerOrderId, BrokerClientError>>>,
    cancel_results: Mutex<VecDeque<Result<BrokerOrderId, BrokerClientError>>>,
    orders: Mutex<Result<Vec<BrokerOrder>, BrokerClientError>>,
    positions: Mutex<Result<Vec<BrokerPosition>, BrokerClientError>>,
    margins: Mutex<Result<Vec<BrokerMargin>, BrokerClientError>>,
    place_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    orders_calls: AtomicUsize,
    margins_calls: AtomicUsize,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self {
            delay: None,
            place_results: Mutex::new(VecDeque::new()),
            cancel_results: Mutex::new(VecDeque::new()),
            orders: Mutex::new(Ok(Vec::new())),
            positions: Mutex::new(Ok(Vec::new())),
            margins: Mutex::new(Ok(Vec::new())),
            place_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            orders_calls: AtomicUsize::new(0),
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

    pub fn push_cancel(&self, result: Result<BrokerOrderId, BrokerClientError>) {
        self.cancel_results.lock().unwrap().push_back(result);
    }

    pub fn set_orders(&self, result: Result<Vec<BrokerOrder>, BrokerClientError>) {
        *self.orders.lock().unwrap() = result;
    }

    pub fn set_positions(&self, result: Result<Vec<BrokerPosition>, BrokerClientError>) {
        *self.positions.lock().unwrap() = result;
    }

    pub fn set_margins(&self, result: Result<Vec<BrokerMargin>, BrokerClientError>) {
        *self.margins.lock().unwrap() = result;
    }

    pub fn place_calls(&self) -> usize {
        self.place_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn orders_calls(&self) -> usize {
        self.orders_calls.load(Ordering::SeqCst)
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
impl BrokerClient for ScriptedBroker {
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
        self.pause().await;
        Ok(order_id.clone())
    }

    async fn cancel_order(
        &self,
        order_id: &BrokerOrderId,
    ) -> Result<BrokerOrderId, BrokerClientError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let scripted = self.cancel_results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(order_id.clone()))
    }

    async fn place_trigger_order(
        &self,
        _params: &TriggerOrderParams,
    ) -> Result<TriggerId, BrokerClientError> {
        self.pause().await;
        Ok(TriggerId::new("t-1"))
    }

    async fn cancel_trigger_order(
        &self,
        trigger_id: &TriggerId,
    ) -> Result<TriggerId, BrokerClientError> {
        self.pause().await;
        Ok(trigger_id.clone())
    }

    async fn orders(&self) -> Result<Vec<BrokerOrder>, BrokerClientError> {
        self.orders_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.orders.lock().unwrap().clone()
    }

    async fn positions(&self) -> Result<Vec<BrokerPosition>, BrokerClientError> {
        self.pause().await;
        self.positions.lock().unwrap().clone()
    }

    async fn holdings(&self) -> Result<Vec<BrokerHolding>, BrokerClientError> {
        self.pause().await;
        Ok(Vec::new())
    }

    async fn margins(&self) -> Result<Vec<BrokerMargin>, BrokerClientError> {
        self.margins_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.margins.lock().unwrap().clone()
    }
}
