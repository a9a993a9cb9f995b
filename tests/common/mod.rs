// Common test utilities: a scripted exchange and ladder builders
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ampl_ladder::{
    ExchangeError, ExchangeOrder, ExchangePort, LadderReconciler, LadderSettings, LimitOrder,
    OrderState, Side,
};

pub const SYMBOL: &str = "AMPL-USDT";
pub const LEVELS: [f64; 8] = [1.16, 1.12, 1.08, 1.04, 1.00, 0.96, 0.92, 0.85];

#[derive(Default)]
struct MockBook {
    active: Vec<ExchangeOrder>,
    statuses: HashMap<String, OrderState>,
    balance: f64,
    ticker: f64,
    next_id: usize,
    placed: Vec<LimitOrder>,
    cancel_calls: Vec<String>,
    status_calls: Vec<String>,
    fail_place_prices: Vec<f64>,
    fail_sells: bool,
    fail_cancel: HashSet<String>,
    fail_status: HashSet<String>,
    fail_active_orders: bool,
    fail_balance: bool,
    fail_ticker: bool,
}

/// In-memory exchange with failure injection and call recording
pub struct MockExchange {
    book: Mutex<MockBook>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            book: Mutex::new(MockBook {
                ticker: 1.05,
                ..MockBook::default()
            }),
        }
    }

    pub fn with_balance(self, balance: f64) -> Self {
        self.set_balance(balance);
        self
    }

    pub fn set_balance(&self, balance: f64) {
        self.book.lock().unwrap().balance = balance;
    }

    /// Seed a live order that the ladder did not place
    pub fn add_order(&self, order_id: &str, side: Side, price: f64, size: f64) {
        let mut book = self.book.lock().unwrap();
        book.active.push(ExchangeOrder {
            order_id: order_id.to_string(),
            side,
            price,
            size,
        });
        book.statuses.insert(order_id.to_string(), OrderState::Active);
    }

    fn finish(&self, order_id: &str, state: OrderState) {
        let mut book = self.book.lock().unwrap();
        book.active.retain(|o| o.order_id != order_id);
        book.statuses.insert(order_id.to_string(), state);
    }

    pub fn fill(&self, order_id: &str) {
        self.finish(order_id, OrderState::Filled);
    }

    pub fn cancel_externally(&self, order_id: &str) {
        self.finish(order_id, OrderState::Cancelled);
    }

    pub fn mark_inactive(&self, order_id: &str) {
        self.finish(order_id, OrderState::Inactive);
    }

    pub fn fail_place_at(&self, price: f64) {
        self.book.lock().unwrap().fail_place_prices.push(price);
    }

    pub fn fail_sells(&self) {
        self.book.lock().unwrap().fail_sells = true;
    }

    pub fn fail_cancel_for(&self, order_id: &str) {
        self.book.lock().unwrap().fail_cancel.insert(order_id.to_string());
    }

    pub fn fail_status_for(&self, order_id: &str) {
        self.book.lock().unwrap().fail_status.insert(order_id.to_string());
    }

    pub fn fail_active_orders(&self, fail: bool) {
        self.book.lock().unwrap().fail_active_orders = fail;
    }

    pub fn fail_balance(&self, fail: bool) {
        self.book.lock().unwrap().fail_balance = fail;
    }

    pub fn fail_ticker(&self, fail: bool) {
        self.book.lock().unwrap().fail_ticker = fail;
    }

    pub fn placed(&self) -> Vec<LimitOrder> {
        self.book.lock().unwrap().placed.clone()
    }

    pub fn placed_buys(&self) -> Vec<LimitOrder> {
        self.placed().into_iter().filter(|o| o.side == Side::Buy).collect()
    }

    pub fn placed_sells(&self) -> Vec<LimitOrder> {
        self.placed().into_iter().filter(|o| o.side == Side::Sell).collect()
    }

    pub fn cancel_calls(&self) -> Vec<String> {
        self.book.lock().unwrap().cancel_calls.clone()
    }

    pub fn status_calls(&self) -> Vec<String> {
        self.book.lock().unwrap().status_calls.clone()
    }

    pub fn active(&self) -> Vec<ExchangeOrder> {
        self.book.lock().unwrap().active.clone()
    }

    pub fn active_buy_at(&self, price: f64) -> Option<ExchangeOrder> {
        self.active()
            .into_iter()
            .find(|o| o.side == Side::Buy && (o.price - price).abs() < 1e-9)
    }

    pub fn clear_calls(&self) {
        let mut book = self.book.lock().unwrap();
        book.placed.clear();
        book.cancel_calls.clear();
        book.status_calls.clear();
    }
}

#[async_trait]
impl ExchangePort for MockExchange {
    async fn get_active_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        assert_eq!(symbol, SYMBOL);
        let book = self.book.lock().unwrap();
        if book.fail_active_orders {
            return Err(ExchangeError::Network("connection reset".to_string()));
        }
        Ok(book.active.clone())
    }

    async fn place_limit_order(&self, order: &LimitOrder) -> Result<String, ExchangeError> {
        let mut book = self.book.lock().unwrap();
        book.placed.push(order.clone());

        let rejected = match order.side {
            Side::Buy => book.fail_place_prices.iter().any(|p| (p - order.price).abs() < 1e-9),
            Side::Sell => book.fail_sells,
        };
        if rejected {
            return Err(ExchangeError::Rejected(format!("{} @ {} rejected", order.side, order.price)));
        }

        book.next_id += 1;
        let order_id = format!("{}-{}", order.side, book.next_id);
        book.active.push(ExchangeOrder {
            order_id: order_id.clone(),
            side: order.side,
            price: order.price,
            size: order.size,
        });
        book.statuses.insert(order_id.clone(), OrderState::Active);
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        let mut book = self.book.lock().unwrap();
        book.cancel_calls.push(order_id.to_string());
        if book.fail_cancel.contains(order_id) {
            return Err(ExchangeError::Timeout(format!("cancel {}", order_id)));
        }
        book.active.retain(|o| o.order_id != order_id);
        book.statuses.insert(order_id.to_string(), OrderState::Cancelled);
        Ok(())
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderState, ExchangeError> {
        let mut book = self.book.lock().unwrap();
        book.status_calls.push(order_id.to_string());
        if book.fail_status.contains(order_id) {
            return Err(ExchangeError::Timeout(format!("status {}", order_id)));
        }
        book.statuses.get(order_id).copied().ok_or_else(|| ExchangeError::Api {
            code: "400100".to_string(),
            message: format!("order {} does not exist", order_id),
        })
    }

    async fn get_account_balance(&self, _asset: &str) -> Result<f64, ExchangeError> {
        let book = self.book.lock().unwrap();
        if book.fail_balance {
            return Err(ExchangeError::Http(502));
        }
        Ok(book.balance)
    }

    async fn get_ticker_price(&self, _symbol: &str) -> Result<f64, ExchangeError> {
        let book = self.book.lock().unwrap();
        if book.fail_ticker {
            return Err(ExchangeError::Timeout("ticker".to_string()));
        }
        Ok(book.ticker)
    }
}

/// Default ladder: 8 levels from 1.16 to 0.85, size 10, 3% markup
pub fn test_settings() -> LadderSettings {
    LadderSettings {
        symbol: SYMBOL.to_string(),
        buy_levels: LEVELS.to_vec(),
        order_size: 10.0,
        ..LadderSettings::default()
    }
}

pub fn reconciler_for(exchange: &Arc<MockExchange>) -> LadderReconciler<Arc<MockExchange>> {
    LadderReconciler::new(test_settings(), exchange.clone()).expect("valid test settings")
}

pub fn reconciler_with(
    settings: LadderSettings,
    exchange: &Arc<MockExchange>,
) -> LadderReconciler<Arc<MockExchange>> {
    LadderReconciler::new(settings, exchange.clone()).expect("valid test settings")
}

/// Seed one live buy per given level with generated ids `seed-<level>`
pub fn seed_ladder(exchange: &MockExchange, levels: &[usize]) {
    for &level in levels {
        exchange.add_order(&format!("seed-{}", level), Side::Buy, LEVELS[level], 10.0);
    }
}
