// Paper exchange: in-memory limit order book for dry runs and demos
//
// Resting limit orders fill when the ticker crosses them. Buy fills credit the
// base asset; placing a sell locks base asset, so a sell larger than the
// available balance is rejected exactly as a live exchange would.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clients::exchange::{
    ExchangeError, ExchangeOrder, ExchangePort, LimitOrder, OrderState, Side,
};

#[derive(Debug, Clone)]
struct PaperOrder {
    order: ExchangeOrder,
    client_oid: String,
    state: OrderState,
}

#[derive(Debug)]
struct PaperBook {
    price: f64,
    available: f64,
    locked: f64,
    orders: HashMap<String, PaperOrder>,
    by_client_oid: HashMap<String, String>,
}

pub struct PaperExchange {
    symbol: String,
    base_asset: String,
    book: Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(symbol: impl Into<String>, base_asset: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            base_asset: base_asset.into(),
            book: Mutex::new(PaperBook {
                price,
                available: 0.0,
                locked: 0.0,
                orders: HashMap::new(),
                by_client_oid: HashMap::new(),
            }),
        }
    }

    pub fn with_balance(self, available: f64) -> Self {
        if let Ok(mut book) = self.book.lock() {
            book.available = available;
        }
        self
    }

    fn book(&self) -> Result<MutexGuard<'_, PaperBook>, ExchangeError> {
        self.book
            .lock()
            .map_err(|_| ExchangeError::Unavailable("paper book lock poisoned".to_string()))
    }

    pub fn price(&self) -> Result<f64, ExchangeError> {
        Ok(self.book()?.price)
    }

    /// Move the ticker and fill every order it crosses. Returns filled order ids.
    pub fn set_price(&self, price: f64) -> Result<Vec<String>, ExchangeError> {
        let mut book = self.book()?;
        book.price = price;

        let crossed: Vec<String> = book
            .orders
            .values()
            .filter(|o| o.state.is_active())
            .filter(|o| match o.order.side {
                Side::Buy => price <= o.order.price,
                Side::Sell => price >= o.order.price,
            })
            .map(|o| o.order.order_id.clone())
            .collect();

        for order_id in &crossed {
            Self::fill(&mut book, order_id);
        }

        Ok(crossed)
    }

    /// Random-walk the ticker by up to `max_step` (fractional) and apply fills
    pub fn step_random<R: Rng>(&self, rng: &mut R, max_step: f64) -> Result<(f64, Vec<String>), ExchangeError> {
        if !(max_step >= 0.0 && max_step.is_finite()) {
            return Err(ExchangeError::Rejected(format!(
                "price step must be a finite non-negative fraction, got {}", max_step
            )));
        }
        let current = self.price()?;
        let change = rng.gen_range(-max_step..=max_step);
        let next = (current * (1.0 + change)).max(0.0001);
        let filled = self.set_price(next)?;
        Ok((next, filled))
    }

    /// Fill one order regardless of the ticker
    pub fn fill_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        let mut book = self.book()?;
        if !book.orders.get(order_id).map_or(false, |o| o.state.is_active()) {
            return Err(ExchangeError::Rejected(format!("order {} is not active", order_id)));
        }
        Self::fill(&mut book, order_id);
        Ok(())
    }

    /// Cancel an order as if someone did it from another client
    pub fn cancel_externally(&self, order_id: &str) -> Result<(), ExchangeError> {
        let mut book = self.book()?;
        Self::cancel(&mut book, order_id)
    }

    /// Scale the free balance, as a supply rebase does
    pub fn apply_rebase(&self, factor: f64) -> Result<f64, ExchangeError> {
        let mut book = self.book()?;
        book.available *= factor;
        info!("🌀 Paper rebase x{:.4}: {} available {:.6}", factor, self.base_asset, book.available);
        Ok(book.available)
    }

    pub fn balance(&self) -> Result<(f64, f64), ExchangeError> {
        let book = self.book()?;
        Ok((book.available, book.locked))
    }

    fn fill(book: &mut PaperBook, order_id: &str) {
        let Some(entry) = book.orders.get_mut(order_id) else {
            return;
        };
        entry.state = OrderState::Filled;
        let (side, size, price) = (entry.order.side, entry.order.size, entry.order.price);
        let client_oid = entry.client_oid.clone();

        match side {
            Side::Buy => book.available += size,
            Side::Sell => book.locked = (book.locked - size).max(0.0),
        }
        debug!("Paper fill: {} {} @ {:.4} ({}, {})", side, size, price, order_id, client_oid);
    }

    fn cancel(book: &mut PaperBook, order_id: &str) -> Result<(), ExchangeError> {
        let entry = book
            .orders
            .get_mut(order_id)
            .filter(|o| o.state.is_active())
            .ok_or_else(|| ExchangeError::Api {
                code: "400100".to_string(),
                message: format!("order {} not found or not active", order_id),
            })?;
        entry.state = OrderState::Cancelled;

        if entry.order.side == Side::Sell {
            let size = entry.order.size;
            book.locked = (book.locked - size).max(0.0);
            book.available += size;
        }
        Ok(())
    }

    fn check_symbol(&self, symbol: &str) -> Result<(), ExchangeError> {
        if symbol != self.symbol {
            return Err(ExchangeError::Api {
                code: "400100".to_string(),
                message: format!("unsupported symbol {}", symbol),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ExchangePort for PaperExchange {
    async fn get_active_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        self.check_symbol(symbol)?;
        let book = self.book()?;
        let mut orders: Vec<ExchangeOrder> = book
            .orders
            .values()
            .filter(|o| o.state.is_active())
            .map(|o| o.order.clone())
            .collect();
        orders.sort_by(|a, b| b.price.total_cmp(&a.price));
        Ok(orders)
    }

    async fn place_limit_order(&self, order: &LimitOrder) -> Result<String, ExchangeError> {
        self.check_symbol(&order.symbol)?;
        if !(order.size > 0.0) || !(order.price > 0.0) {
            return Err(ExchangeError::Rejected("size and price must be positive".to_string()));
        }

        let mut book = self.book()?;

        if let Some(existing) = book.by_client_oid.get(&order.client_oid) {
            return Ok(existing.clone());
        }

        if order.side == Side::Sell {
            if order.size > book.available {
                return Err(ExchangeError::Rejected(format!(
                    "insufficient {}: available {:.6}, requested {}",
                    self.base_asset, book.available, order.size
                )));
            }
            book.available -= order.size;
            book.locked += order.size;
        }

        let order_id = Uuid::new_v4().to_string();
        book.orders.insert(
            order_id.clone(),
            PaperOrder {
                order: ExchangeOrder {
                    order_id: order_id.clone(),
                    side: order.side,
                    price: order.price,
                    size: order.size,
                },
                client_oid: order.client_oid.clone(),
                state: OrderState::Active,
            },
        );
        book.by_client_oid.insert(order.client_oid.clone(), order_id.clone());

        // Marketable on arrival
        let crosses = match order.side {
            Side::Buy => book.price <= order.price,
            Side::Sell => book.price >= order.price,
        };
        if crosses {
            Self::fill(&mut book, &order_id);
        }

        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        let mut book = self.book()?;
        Self::cancel(&mut book, order_id)
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderState, ExchangeError> {
        let book = self.book()?;
        book.orders
            .get(order_id)
            .map(|o| o.state)
            .ok_or_else(|| ExchangeError::Api {
                code: "400100".to_string(),
                message: format!("order {} does not exist", order_id),
            })
    }

    async fn get_account_balance(&self, asset: &str) -> Result<f64, ExchangeError> {
        if asset != self.base_asset {
            return Ok(0.0);
        }
        Ok(self.book()?.available)
    }

    async fn get_ticker_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        self.check_symbol(symbol)?;
        self.price()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn buy(price: f64, oid: &str) -> LimitOrder {
        LimitOrder {
            symbol: "AMPL-USDT".to_string(),
            side: Side::Buy,
            size: 10.0,
            price,
            client_oid: oid.to_string(),
        }
    }

    #[tokio::test]
    async fn test_buy_fills_when_price_crosses() {
        let paper = PaperExchange::new("AMPL-USDT", "AMPL", 1.10);
        let id = paper.place_limit_order(&buy(1.04, "b1")).await.unwrap();
        assert_eq!(paper.get_order_status(&id).await.unwrap(), OrderState::Active);

        let filled = paper.set_price(1.03).unwrap();
        assert_eq!(filled, vec![id.clone()]);
        assert_eq!(paper.get_order_status(&id).await.unwrap(), OrderState::Filled);
        assert_eq!(paper.get_account_balance("AMPL").await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn test_client_oid_is_idempotent() {
        let paper = PaperExchange::new("AMPL-USDT", "AMPL", 1.10);
        let first = paper.place_limit_order(&buy(1.0, "same")).await.unwrap();
        let second = paper.place_limit_order(&buy(1.0, "same")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(paper.get_active_orders("AMPL-USDT").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sell_larger_than_balance_is_rejected() {
        let paper = PaperExchange::new("AMPL-USDT", "AMPL", 1.0).with_balance(9.5);
        let sell = LimitOrder { side: Side::Sell, price: 1.03, ..buy(1.03, "s1") };
        let result = paper.place_limit_order(&sell).await;
        assert!(matches!(result, Err(ExchangeError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_external_cancel_reports_cancelled() {
        let paper = PaperExchange::new("AMPL-USDT", "AMPL", 1.10);
        let id = paper.place_limit_order(&buy(0.96, "b2")).await.unwrap();
        paper.cancel_externally(&id).unwrap();
        assert_eq!(paper.get_order_status(&id).await.unwrap(), OrderState::Cancelled);
        assert!(paper.cancel_order(&id).await.is_err());
    }

    #[test]
    fn test_rebase_scales_available_balance() {
        let paper = PaperExchange::new("AMPL-USDT", "AMPL", 1.0).with_balance(10.0);
        let after = paper.apply_rebase(0.9).unwrap();
        assert!((after - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_random_walk_is_reproducible() {
        let a = PaperExchange::new("AMPL-USDT", "AMPL", 1.0);
        let b = PaperExchange::new("AMPL-USDT", "AMPL", 1.0);
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let (pa, _) = a.step_random(&mut rng_a, 0.02).unwrap();
            let (pb, _) = b.step_random(&mut rng_b, 0.02).unwrap();
            assert_eq!(pa, pb);
        }
    }

    #[test]
    fn test_random_walk_rejects_bad_step() {
        let paper = PaperExchange::new("AMPL-USDT", "AMPL", 1.0);
        let mut rng = StdRng::seed_from_u64(7);
        for step in [-0.01, f64::NAN, f64::INFINITY] {
            let result = paper.step_random(&mut rng, step);
            assert!(matches!(result, Err(ExchangeError::Rejected(_))), "step {}", step);
        }
        assert_eq!(paper.price().unwrap(), 1.0);

        let (price, _) = paper.step_random(&mut rng, 0.0).unwrap();
        assert_eq!(price, 1.0);
    }
}
