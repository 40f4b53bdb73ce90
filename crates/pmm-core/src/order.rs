//! Order-related types and identifiers.

use crate::{Price, Qty, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Returns 1 for buy, -1 for sell (for position calculations).
    pub fn sign(&self) -> i8 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Position side for hedge-mode accounts.
///
/// `Both` is the one-way-mode side where a single signed position
/// carries the exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
    #[default]
    Both,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::Both => write!(f, "BOTH"),
        }
    }
}

/// Time-in-force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-til-cancelled (resting maker quotes).
    #[default]
    #[serde(rename = "Gtc")]
    GoodTilCancelled,
    /// Immediate-or-cancel.
    #[serde(rename = "Ioc")]
    ImmediateOrCancel,
    /// Post-only: reject instead of crossing the book.
    #[serde(rename = "Gtx")]
    PostOnly,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoodTilCancelled => write!(f, "GTC"),
            Self::ImmediateOrCancel => write!(f, "IOC"),
            Self::PostOnly => write!(f, "GTX"),
        }
    }
}

/// Client order ID for idempotency.
///
/// Every submitted order carries a unique cloid so a retried request
/// cannot create a duplicate order on the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new unique client order ID.
    ///
    /// Format: `pmm_{timestamp_ms}_{uuid_short}`
    pub fn new() -> Self {
        let ts = Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("pmm_{ts}_{uuid_short}"))
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resting limit order tracked by the engine.
///
/// Created on acknowledged placement, removed on cancel/fill
/// acknowledgment or cancel-all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Exchange-assigned order id.
    pub id: String,
    /// Client-assigned id used at submission.
    pub client_id: ClientOrderId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub price: Price,
    pub qty: Qty,
    /// When the order was acknowledged by the exchange.
    pub placed_at: DateTime<Utc>,
}

impl Order {
    /// Age of this order in seconds at `now`.
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.placed_at).num_milliseconds() as f64 / 1000.0
    }

    /// Absolute distance of the order price from `mid`, in basis points.
    pub fn deviation_bps(&self, mid: Price) -> Option<Decimal> {
        self.price.deviation_bps(mid)
    }

    /// Notional value at the order's own price.
    pub fn notional(&self) -> Decimal {
        self.qty.notional(self.price).abs()
    }
}
