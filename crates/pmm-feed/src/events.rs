//! Events delivered by the external stream adapters.

use pmm_core::{Fill, PositionBook, Price, Qty, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Public market-data events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    /// New mid price derived from best bid/ask.
    Mid { symbol: Symbol, mid: Price },
    /// Public trade print.
    Trade {
        symbol: Symbol,
        price: Price,
        qty: Qty,
    },
}

/// Private account-stream events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AccountEvent {
    /// Full position snapshot (ground truth).
    Positions(HashMap<Symbol, PositionBook>),
    /// A fill on one of our orders.
    Fill(Fill),
    /// An order left the book (filled or cancelled).
    OrderGone { symbol: Symbol, order_id: String },
}

/// Union of both streams, as delivered on the single feed channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeedEvent {
    Market(MarketEvent),
    Account(AccountEvent),
}
