//! Symbol identifier and exchange market metadata.

use crate::error::CoreError;
use crate::{Price, Qty};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Price precision used when no market metadata is loaded.
pub const DEFAULT_PRICE_DECIMALS: u32 = 4;

/// Quantity precision used when no market metadata is loaded.
pub const DEFAULT_QTY_DECIMALS: u32 = 3;

/// Trading pair identifier (e.g. "BTCUSDT").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Per-symbol market metadata from the exchange.
///
/// In strict markets mode this is loaded from a pre-validated file and
/// checked for completeness before any order is placed; otherwise the
/// engine falls back to `DEFAULT_PRICE_DECIMALS` / `DEFAULT_QTY_DECIMALS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSpec {
    /// Price precision in decimal places.
    pub price_decimals: u32,
    /// Quantity precision in decimal places.
    pub qty_decimals: u32,
    /// Minimum order quantity.
    pub min_qty: Qty,
    /// Minimum order notional in quote currency.
    #[serde(default)]
    pub min_notional: Decimal,
}

impl MarketSpec {
    /// Validate completeness for strict markets mode.
    ///
    /// A spec that would let the engine submit mispriced or rejected
    /// orders is a startup-fatal error, not a runtime warning.
    pub fn validate(&self, symbol: &Symbol) -> Result<(), CoreError> {
        if self.price_decimals > 12 {
            return Err(CoreError::InvalidMarketSpec(
                symbol.to_string(),
                format!("price_decimals {} out of range", self.price_decimals),
            ));
        }
        if self.qty_decimals > 12 {
            return Err(CoreError::InvalidMarketSpec(
                symbol.to_string(),
                format!("qty_decimals {} out of range", self.qty_decimals),
            ));
        }
        if !self.min_qty.is_positive() {
            return Err(CoreError::InvalidMarketSpec(
                symbol.to_string(),
                "min_qty must be positive".to_string(),
            ));
        }
        if self.min_notional.is_sign_negative() {
            return Err(CoreError::InvalidMarketSpec(
                symbol.to_string(),
                "min_notional must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Round a price to this market's tick precision.
    pub fn round_price(&self, price: Price) -> Price {
        price.round_dp(self.price_decimals)
    }

    /// Round a quantity down to this market's lot precision,
    /// zeroing anything below `min_qty`.
    pub fn round_qty(&self, qty: Qty) -> Qty {
        let rounded = qty.round_dp(self.qty_decimals);
        if rounded < self.min_qty {
            Qty::ZERO
        } else {
            rounded
        }
    }
}
