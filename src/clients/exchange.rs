// Exchange port consumed by the ladder reconciler
//
// Authentication, transport, timeouts and retries belong to the implementations.
// The reconciler treats every failure as final for the item it was working on.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open order as reported by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub order_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

/// Limit order submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    pub price: f64,
    /// Client-side idempotency token
    pub client_oid: String,
}

/// Lifecycle state of a single order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Active,
    Filled,
    Cancelled,
    /// No longer active, but the exchange did not say why
    Inactive,
}

impl OrderState {
    pub fn is_active(&self) -> bool {
        matches!(self, OrderState::Active)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExchangeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Exchange API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Authentication error: {0}")]
    Credentials(String),

    #[error("Exchange unavailable: {0}")]
    Unavailable(String),
}

impl ExchangeError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::Network(_) | ExchangeError::Timeout(_) | ExchangeError::Unavailable(_) => true,
            ExchangeError::Http(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            ExchangeError::Http(status.as_u16())
        } else if err.is_decode() {
            ExchangeError::Parse(err.to_string())
        } else {
            ExchangeError::Network(err.to_string())
        }
    }
}

/// Order and balance operations the ladder depends on
#[async_trait]
pub trait ExchangePort: Send + Sync {
    /// All currently open orders for the pair
    async fn get_active_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError>;

    /// Submit a limit order and return the exchange order id
    async fn place_limit_order(&self, order: &LimitOrder) -> Result<String, ExchangeError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError>;

    async fn get_order_status(&self, order_id: &str) -> Result<OrderState, ExchangeError>;

    /// Available (unlocked) quantity of an asset
    async fn get_account_balance(&self, asset: &str) -> Result<f64, ExchangeError>;

    async fn get_ticker_price(&self, symbol: &str) -> Result<f64, ExchangeError>;
}

#[async_trait]
impl<T: ExchangePort + ?Sized> ExchangePort for Arc<T> {
    async fn get_active_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        (**self).get_active_orders(symbol).await
    }

    async fn place_limit_order(&self, order: &LimitOrder) -> Result<String, ExchangeError> {
        (**self).place_limit_order(order).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        (**self).cancel_order(order_id).await
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderState, ExchangeError> {
        (**self).get_order_status(order_id).await
    }

    async fn get_account_balance(&self, asset: &str) -> Result<f64, ExchangeError> {
        (**self).get_account_balance(asset).await
    }

    async fn get_ticker_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        (**self).get_ticker_price(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ExchangeError::Http(503).is_retryable());
        assert!(ExchangeError::Http(429).is_retryable());
        assert!(!ExchangeError::Http(400).is_retryable());
        assert!(!ExchangeError::Api { code: "400100".into(), message: "bad".into() }.is_retryable());
    }

    #[test]
    fn test_side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"buy\"");
        assert_eq!(Side::Sell.to_string(), "sell");
    }
}
