//! Binance USDⓈ-M futures REST adapter.
//!
//! Signed requests: HMAC-SHA256 over the query string, signature
//! appended as the last parameter. Error bodies `{code, msg}` are
//! mapped onto the classified taxonomy:
//! - `-2011` (unknown order / nothing to cancel) → `NoOpenOrders`
//! - `-1003`, HTTP 418/429 → `RateLimited`
//! - everything else → `Other`

use crate::error::{EngineError, EngineResult};
use crate::exchange::{ExchangeClient, ExchangeConfig, ExchangeError, OrderParams};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use pmm_core::{OrderSide, PositionSide, Price, Qty, Symbol};
use serde::Deserialize;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const MAINNET_BASE: &str = "https://fapi.binance.com";
const TESTNET_BASE: &str = "https://testnet.binancefuture.com";

fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn sign_query(secret: &str, query: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct OrderAck {
    #[serde(rename = "orderId")]
    order_id: u64,
}

/// Binance futures REST client.
pub struct BinanceFutures {
    http: reqwest::Client,
    base: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
}

impl BinanceFutures {
    pub fn new(config: &ExchangeConfig) -> EngineResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| EngineError::HttpClient(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| EngineError::HttpClient(e.to_string()))?;

        let base = if config.testnet {
            TESTNET_BASE.to_string()
        } else {
            MAINNET_BASE.to_string()
        };

        Ok(Self {
            http,
            base,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            recv_window_ms: config.recv_window_ms,
        })
    }

    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let mut query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        query.push_str(&format!(
            "&recvWindow={}&timestamp={}",
            self.recv_window_ms,
            timestamp_ms()
        ));
        let signature = sign_query(&self.api_secret, &query);
        format!("{query}&signature={signature}")
    }

    async fn send_signed(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<String, ExchangeError> {
        let url = format!("{}{}?{}", self.base, path, self.signed_query(params));
        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Other(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::Other(format!("body read failed: {e}")))?;

        if status.is_success() {
            return Ok(body);
        }

        Err(classify_error(status.as_u16(), &body))
    }

    fn order_common<'a>(
        symbol: &Symbol,
        side: OrderSide,
        qty: Qty,
        params: &'a OrderParams,
    ) -> Vec<(&'a str, String)> {
        let mut out = vec![
            ("symbol", symbol.to_string()),
            (
                "side",
                match side {
                    OrderSide::Buy => "BUY".to_string(),
                    OrderSide::Sell => "SELL".to_string(),
                },
            ),
            ("positionSide", params.position_side.to_string()),
            ("quantity", qty.to_string()),
        ];
        // In hedge mode the positionSide already implies reduce-only;
        // Binance rejects the explicit flag alongside LONG/SHORT.
        if params.reduce_only && params.position_side == PositionSide::Both {
            out.push(("reduceOnly", "true".to_string()));
        }
        if let Some(cloid) = &params.client_id {
            out.push(("newClientOrderId", cloid.to_string()));
        }
        out
    }
}

fn classify_error(status: u16, body: &str) -> ExchangeError {
    if status == 429 || status == 418 {
        return ExchangeError::RateLimited(format!("http {status}"));
    }
    match serde_json::from_str::<ApiError>(body) {
        Ok(api) => match api.code {
            -2011 => ExchangeError::NoOpenOrders,
            -1003 => ExchangeError::RateLimited(api.msg),
            _ => ExchangeError::Other(format!("code {}: {}", api.code, api.msg)),
        },
        Err(_) => ExchangeError::Other(format!("http {status}: {body}")),
    }
}

#[async_trait]
impl ExchangeClient for BinanceFutures {
    async fn create_limit_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        qty: Qty,
        price: Price,
        params: OrderParams,
    ) -> Result<String, ExchangeError> {
        let mut form = Self::order_common(symbol, side, qty, &params);
        form.push(("type", "LIMIT".to_string()));
        form.push(("timeInForce", params.time_in_force.to_string()));
        form.push(("price", price.to_string()));

        let body = self
            .send_signed(reqwest::Method::POST, "/fapi/v1/order", &form)
            .await?;
        let ack: OrderAck = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::Other(format!("bad order ack: {e}")))?;
        debug!(symbol = %symbol, %side, %qty, %price, order_id = ack.order_id, "limit order placed");
        Ok(ack.order_id.to_string())
    }

    async fn create_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        qty: Qty,
        params: OrderParams,
    ) -> Result<String, ExchangeError> {
        let mut form = Self::order_common(symbol, side, qty, &params);
        form.push(("type", "MARKET".to_string()));

        let body = self
            .send_signed(reqwest::Method::POST, "/fapi/v1/order", &form)
            .await?;
        let ack: OrderAck = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::Other(format!("bad order ack: {e}")))?;
        debug!(symbol = %symbol, %side, %qty, order_id = ack.order_id, "market order placed");
        Ok(ack.order_id.to_string())
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> Result<(), ExchangeError> {
        let form = vec![
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ];
        self.send_signed(reqwest::Method::DELETE, "/fapi/v1/order", &form)
            .await?;
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<(), ExchangeError> {
        let form = vec![("symbol", symbol.to_string())];
        match self
            .send_signed(reqwest::Method::DELETE, "/fapi/v1/allOpenOrders", &form)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                if !e.is_no_open_orders() {
                    warn!(symbol = %symbol, error = %e, "cancel-all failed");
                }
                Err(e)
            }
        }
    }
}
