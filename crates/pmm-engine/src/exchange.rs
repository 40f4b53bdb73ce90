//! Exchange adapter boundary.
//!
//! One explicit async trait with a concrete implementation per
//! supported exchange, chosen by configuration at startup. Errors are
//! pre-classified so the engine can tell benign conditions ("no open
//! orders") and throttling apart from genuine failures.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use pmm_core::{ClientOrderId, OrderSide, PositionSide, Price, Qty, Symbol, TimeInForce};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Classified exchange errors.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// Cancel on an empty book; benign.
    #[error("no open orders")]
    NoOpenOrders,

    /// Request throttled by the exchange.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Anything else: network, rejection, parse failure.
    #[error("{0}")]
    Other(String),
}

impl ExchangeError {
    pub fn is_no_open_orders(&self) -> bool {
        matches!(self, Self::NoOpenOrders)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Submission parameters shared by order calls.
#[derive(Debug, Clone, Default)]
pub struct OrderParams {
    pub position_side: PositionSide,
    pub reduce_only: bool,
    pub time_in_force: TimeInForce,
    pub client_id: Option<ClientOrderId>,
}

impl OrderParams {
    /// Parameters for a reduce-only market order against `position_side`.
    pub fn reduce_only(position_side: PositionSide) -> Self {
        Self {
            position_side,
            reduce_only: true,
            time_in_force: TimeInForce::ImmediateOrCancel,
            client_id: Some(ClientOrderId::new()),
        }
    }

    /// Parameters for a resting maker quote.
    pub fn maker(position_side: PositionSide) -> Self {
        Self {
            position_side,
            reduce_only: false,
            time_in_force: TimeInForce::GoodTilCancelled,
            client_id: Some(ClientOrderId::new()),
        }
    }
}

/// Async order API implemented per exchange.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit a limit order; returns the exchange order id.
    async fn create_limit_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        qty: Qty,
        price: Price,
        params: OrderParams,
    ) -> Result<String, ExchangeError>;

    /// Submit a market order; returns the exchange order id.
    async fn create_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        qty: Qty,
        params: OrderParams,
    ) -> Result<String, ExchangeError>;

    /// Cancel one order by exchange id.
    async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> Result<(), ExchangeError>;

    /// Cancel every open order for the symbol.
    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<(), ExchangeError>;
}

/// Exchange connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Adapter name: "paper" or "binance".
    pub name: String,
    /// Use the exchange testnet endpoints.
    #[serde(default)]
    pub testnet: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    /// Optional HTTP(S) proxy URL.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Binance recvWindow in milliseconds.
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
}

fn default_recv_window_ms() -> u64 {
    5000
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            name: "paper".to_string(),
            testnet: false,
            api_key: String::new(),
            api_secret: String::new(),
            proxy: None,
            recv_window_ms: default_recv_window_ms(),
        }
    }
}

/// Build the configured exchange adapter.
///
/// Explicit factory instead of lookup-by-reflection: unknown names are
/// a startup error.
pub fn build_client(config: &ExchangeConfig) -> EngineResult<Arc<dyn ExchangeClient>> {
    match config.name.as_str() {
        "paper" => Ok(Arc::new(crate::paper::PaperExchange::new())),
        "binance" => Ok(Arc::new(crate::binance::BinanceFutures::new(config)?)),
        other => Err(EngineError::UnknownExchange(other.to_string())),
    }
}
