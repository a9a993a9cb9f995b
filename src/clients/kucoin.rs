// KuCoin spot REST client implementing the exchange port
//
// Private endpoints are signed with HMAC-SHA256 over
// timestamp + METHOD + path(+query) + body, base64 encoded, using API key v2
// (the passphrase is itself HMAC-signed with the secret).

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::debug;

use crate::clients::exchange::{
    ExchangeError, ExchangeOrder, ExchangePort, LimitOrder, OrderState, Side,
};
use crate::config::{Credentials, ExchangeConfig};
use crate::error::LadderResult;

type HmacSha256 = Hmac<Sha256>;

const SUCCESS_CODE: &str = "200000";
const ORDERS_PAGE_SIZE: u32 = 500;

pub struct KucoinClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderItem {
    id: String,
    side: String,
    price: String,
    size: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderPage {
    #[serde(default)]
    total_page: u32,
    #[serde(default)]
    items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacedOrderData {
    order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderDetail {
    is_active: bool,
    #[serde(default)]
    cancel_exist: bool,
    #[serde(default)]
    deal_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountItem {
    available: String,
}

#[derive(Debug, Deserialize)]
struct Level1Ticker {
    price: Option<String>,
}

impl KucoinClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, ExchangeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn from_config(config: &ExchangeConfig) -> LadderResult<Self> {
        let credentials = config.credentials()?;
        let client = Self::new(
            config.rest_url.clone(),
            credentials,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(client)
    }

    fn hmac_base64(&self, message: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.api_secret.as_bytes())
            .map_err(|e| ExchangeError::Credentials(e.to_string()))?;
        mac.update(message.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Request signature for a private endpoint
    pub fn sign(&self, timestamp: &str, method: &str, path: &str, body: &str) -> Result<String, ExchangeError> {
        self.hmac_base64(&format!("{}{}{}{}", timestamp, method.to_uppercase(), path, body))
    }

    /// Key-version 2 passphrase: HMAC of the plain passphrase with the secret
    pub fn signed_passphrase(&self) -> Result<String, ExchangeError> {
        self.hmac_base64(&self.credentials.api_passphrase)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        signed: bool,
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.base_url, path);
        let body = body.map(|b| b.to_string()).unwrap_or_default();

        let mut request = self.client.request(method.clone(), &url);

        if signed {
            let timestamp = Utc::now().timestamp_millis().to_string();
            let signature = self.sign(&timestamp, method.as_str(), path, &body)?;
            request = request
                .header("KC-API-KEY", &self.credentials.api_key)
                .header("KC-API-SIGN", signature)
                .header("KC-API-TIMESTAMP", timestamp)
                .header("KC-API-PASSPHRASE", self.signed_passphrase()?)
                .header("KC-API-KEY-VERSION", "2");
        }

        if !body.is_empty() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        debug!("➡️  {} {}", method, path);
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: ApiEnvelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(ExchangeError::Http(status.as_u16())),
            Err(e) => return Err(ExchangeError::Parse(format!("{}: {}", path, e))),
        };

        if envelope.code != SUCCESS_CODE {
            let message = envelope.msg.unwrap_or_else(|| "unknown error".to_string());
            return Err(match status.as_u16() {
                401 | 403 => ExchangeError::Credentials(message),
                _ => ExchangeError::Api { code: envelope.code, message },
            });
        }

        serde_json::from_value(envelope.data)
            .map_err(|e| ExchangeError::Parse(format!("{}: {}", path, e)))
    }
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<f64, ExchangeError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ExchangeError::Parse(format!("{} is not a number: {:?}", field, value)))
}

/// Plain decimal string without trailing zeros, as the REST API expects
pub(crate) fn format_decimal(value: f64) -> String {
    let formatted = format!("{:.8}", value);
    formatted.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn parse_side(value: &str) -> Result<Side, ExchangeError> {
    match value {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(ExchangeError::Parse(format!("unknown order side {:?}", other))),
    }
}

#[async_trait]
impl ExchangePort for KucoinClient {
    async fn get_active_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        let mut orders = Vec::new();
        let mut page_number = 1;

        // A missed page would make a covered level look empty
        loop {
            let path = format!(
                "/api/v1/orders?status=active&symbol={}&pageSize={}&currentPage={}",
                symbol, ORDERS_PAGE_SIZE, page_number
            );
            let page: OrderPage = self.request(Method::GET, &path, None, true).await?;

            for item in page.items {
                orders.push(ExchangeOrder {
                    side: parse_side(&item.side)?,
                    price: parse_decimal("price", &item.price)?,
                    size: parse_decimal("size", &item.size)?,
                    order_id: item.id,
                });
            }

            if page_number >= page.total_page {
                break;
            }
            page_number += 1;
        }

        debug!("{} active order(s) on {} across {} page(s)", orders.len(), symbol, page_number);
        Ok(orders)
    }

    async fn place_limit_order(&self, order: &LimitOrder) -> Result<String, ExchangeError> {
        let body = json!({
            "clientOid": order.client_oid,
            "side": order.side.as_str(),
            "symbol": order.symbol,
            "type": "limit",
            "price": format_decimal(order.price),
            "size": format_decimal(order.size),
            "timeInForce": "GTC",
        });

        let placed: PlacedOrderData = self
            .request(Method::POST, "/api/v1/orders", Some(body), true)
            .await
            .map_err(|e| match e {
                ExchangeError::Api { code, message } => {
                    ExchangeError::Rejected(format!("{} ({})", message, code))
                }
                other => other,
            })?;

        Ok(placed.order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        let path = format!("/api/v1/orders/{}", order_id);
        let _: Value = self.request(Method::DELETE, &path, None, true).await?;
        Ok(())
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderState, ExchangeError> {
        let path = format!("/api/v1/orders/{}", order_id);
        let detail: OrderDetail = self.request(Method::GET, &path, None, true).await?;

        if detail.is_active {
            return Ok(OrderState::Active);
        }

        // A partial fill that was then cancelled reports as Filled. The sell is
        // still sized from the full purchase, and the balance guard checks the
        // whole wallet, so other holdings can cover the missing part of the lot.

        let dealt = match detail.deal_size.as_deref() {
            Some(size) => parse_decimal("dealSize", size)?,
            None => return Ok(OrderState::Inactive),
        };

        Ok(if detail.cancel_exist && dealt <= 0.0 {
            OrderState::Cancelled
        } else {
            OrderState::Filled
        })
    }

    async fn get_account_balance(&self, asset: &str) -> Result<f64, ExchangeError> {
        let path = format!("/api/v1/accounts?currency={}&type=trade", asset);
        let accounts: Vec<AccountItem> = self.request(Method::GET, &path, None, true).await?;

        accounts
            .iter()
            .map(|a| parse_decimal("available", &a.available))
            .sum()
    }

    async fn get_ticker_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        let path = format!("/api/v1/market/orderbook/level1?symbol={}", symbol);
        let ticker: Level1Ticker = self.request(Method::GET, &path, None, false).await?;

        let price = ticker
            .price
            .ok_or_else(|| ExchangeError::Parse(format!("no ticker price for {}", symbol)))?;
        parse_decimal("price", &price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> KucoinClient {
        KucoinClient::new(
            "https://api.kucoin.com/",
            Credentials {
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
                api_passphrase: "phrase".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_signature_matches_reference() {
        let signature = client()
            .sign("1700000000000", "get", "/api/v1/orders?status=active&symbol=AMPL-USDT", "")
            .unwrap();
        assert_eq!(signature, "LvX9+7/7baeWP7GnZvQCojQd/p9apYhhv5vi/Rs2YpU=");
    }

    #[test]
    fn test_passphrase_is_signed_with_secret() {
        assert_eq!(
            client().signed_passphrase().unwrap(),
            "+n/mrTSNU7CrscsmDK22syRThdivpLcovw6amkVEEug="
        );
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(client().base_url, "https://api.kucoin.com");
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(1.03), "1.03");
        assert_eq!(format_decimal(10.0), "10");
        assert_eq!(format_decimal(0.8755), "0.8755");
    }

    #[test]
    fn test_parse_decimal_rejects_garbage() {
        assert_eq!(parse_decimal("size", "10.5").unwrap(), 10.5);
        assert!(matches!(parse_decimal("size", "ten"), Err(ExchangeError::Parse(_))));
    }
}
