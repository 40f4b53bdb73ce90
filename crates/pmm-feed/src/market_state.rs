//! Last-known market data per symbol.

use crate::events::MarketEvent;
use dashmap::DashMap;
use parking_lot::RwLock;
use pmm_core::{Price, Qty, Symbol};
use std::sync::Arc;
use std::time::Instant;

/// Per-symbol market view.
#[derive(Debug, Default)]
struct SymbolMarket {
    mid: Option<Price>,
    last_trade: Option<(Price, Qty)>,
    /// Monotonic receive time of the last mid update.
    mid_recv: Option<Instant>,
}

/// Aggregated market state, written by the stream applier and read by
/// the tick loop.
#[derive(Default)]
pub struct MarketState {
    symbols: DashMap<Symbol, Arc<RwLock<SymbolMarket>>>,
}

impl MarketState {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, symbol: &Symbol) -> Arc<RwLock<SymbolMarket>> {
        self.symbols
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(RwLock::new(SymbolMarket::default())))
            .clone()
    }

    /// Apply a market event.
    pub fn apply(&self, event: &MarketEvent) {
        match event {
            MarketEvent::Mid { symbol, mid } => {
                let entry = self.entry(symbol);
                let mut guard = entry.write();
                guard.mid = Some(*mid);
                guard.mid_recv = Some(Instant::now());
            }
            MarketEvent::Trade { symbol, price, qty } => {
                let entry = self.entry(symbol);
                entry.write().last_trade = Some((*price, *qty));
            }
        }
    }

    /// Last known mid price, if any.
    pub fn mid(&self, symbol: &Symbol) -> Option<Price> {
        self.symbols.get(symbol).and_then(|e| e.read().mid)
    }

    /// Last public trade print, if any.
    pub fn last_trade(&self, symbol: &Symbol) -> Option<(Price, Qty)> {
        self.symbols.get(symbol).and_then(|e| e.read().last_trade)
    }

    /// Seconds since the last mid update (monotonic).
    pub fn mid_age_secs(&self, symbol: &Symbol) -> Option<f64> {
        self.symbols
            .get(symbol)
            .and_then(|e| e.read().mid_recv)
            .map(|t| t.elapsed().as_secs_f64())
    }

    /// Forget the mid for a symbol (feed gap detected upstream).
    pub fn clear_mid(&self, symbol: &Symbol) {
        if let Some(entry) = self.symbols.get(symbol) {
            entry.write().mid = None;
        }
    }
}
