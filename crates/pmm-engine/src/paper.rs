//! In-memory exchange adapter for paper trading and tests.
//!
//! Accepts every order and tracks open limit orders per symbol so the
//! full engine lifecycle runs without credentials. Market orders ack
//! immediately and rest nowhere.

use crate::exchange::{ExchangeClient, ExchangeError, OrderParams};
use async_trait::async_trait;
use parking_lot::Mutex;
use pmm_core::{OrderSide, Price, Qty, Symbol};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Simulated open order.
#[derive(Debug, Clone)]
pub struct PaperOrder {
    pub id: String,
    pub side: OrderSide,
    pub qty: Qty,
    pub price: Price,
}

/// Accept-everything exchange simulator.
#[derive(Default)]
pub struct PaperExchange {
    next_id: AtomicU64,
    market_orders: AtomicU64,
    open: Mutex<HashMap<Symbol, Vec<PaperOrder>>>,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> String {
        format!("paper-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Open orders for a symbol (test inspection).
    pub fn open_orders(&self, symbol: &Symbol) -> Vec<PaperOrder> {
        self.open.lock().get(symbol).cloned().unwrap_or_default()
    }

    /// Total market orders submitted (test inspection).
    pub fn market_order_count(&self) -> u64 {
        self.market_orders.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn create_limit_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        qty: Qty,
        price: Price,
        _params: OrderParams,
    ) -> Result<String, ExchangeError> {
        let id = self.next_id();
        self.open
            .lock()
            .entry(symbol.clone())
            .or_default()
            .push(PaperOrder {
                id: id.clone(),
                side,
                qty,
                price,
            });
        debug!(symbol = %symbol, %side, %qty, %price, id = %id, "paper limit order");
        Ok(id)
    }

    async fn create_market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        qty: Qty,
        _params: OrderParams,
    ) -> Result<String, ExchangeError> {
        let id = self.next_id();
        self.market_orders.fetch_add(1, Ordering::Relaxed);
        debug!(symbol = %symbol, %side, %qty, id = %id, "paper market order");
        Ok(id)
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> Result<(), ExchangeError> {
        let mut open = self.open.lock();
        let orders = open.get_mut(symbol).ok_or(ExchangeError::NoOpenOrders)?;
        let before = orders.len();
        orders.retain(|o| o.id != order_id);
        if orders.len() == before {
            return Err(ExchangeError::NoOpenOrders);
        }
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<(), ExchangeError> {
        let mut open = self.open.lock();
        match open.get_mut(symbol) {
            Some(orders) if !orders.is_empty() => {
                orders.clear();
                Ok(())
            }
            _ => Err(ExchangeError::NoOpenOrders),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sym() -> Symbol {
        Symbol::from("BTCUSDT")
    }

    #[tokio::test]
    async fn test_limit_order_lifecycle() {
        let ex = PaperExchange::new();
        let id = ex
            .create_limit_order(
                &sym(),
                OrderSide::Buy,
                Qty::new(dec!(1)),
                Price::new(dec!(100)),
                OrderParams::default(),
            )
            .await
            .unwrap();

        assert_eq!(ex.open_orders(&sym()).len(), 1);

        ex.cancel_order(&sym(), &id).await.unwrap();
        assert!(ex.open_orders(&sym()).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all_empty_is_no_open_orders() {
        let ex = PaperExchange::new();
        let err = ex.cancel_all_orders(&sym()).await.unwrap_err();
        assert!(err.is_no_open_orders());
    }

    #[tokio::test]
    async fn test_cancel_all_clears() {
        let ex = PaperExchange::new();
        for _ in 0..3 {
            ex.create_limit_order(
                &sym(),
                OrderSide::Sell,
                Qty::new(dec!(1)),
                Price::new(dec!(101)),
                OrderParams::default(),
            )
            .await
            .unwrap();
        }
        ex.cancel_all_orders(&sym()).await.unwrap();
        assert!(ex.open_orders(&sym()).is_empty());
    }

    #[tokio::test]
    async fn test_market_orders_counted() {
        let ex = PaperExchange::new();
        ex.create_market_order(&sym(), OrderSide::Buy, Qty::new(dec!(1)), OrderParams::default())
            .await
            .unwrap();
        assert_eq!(ex.market_order_count(), 1);
    }
}
