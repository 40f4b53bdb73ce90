//! Quote, fill, and position snapshot types.

use crate::{OrderSide, PositionSide, Price, Qty, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A one-shot two-sided quote instruction for a single level.
///
/// Produced fresh every tick by the strategy, consumed by the engine,
/// never persisted. A zero-qty side means "do not quote that side".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid_price: Price,
    pub bid_qty: Qty,
    pub ask_price: Price,
    pub ask_qty: Qty,
}

impl Quote {
    /// True when neither side carries size.
    pub fn is_empty(&self) -> bool {
        self.bid_qty.is_zero() && self.ask_qty.is_zero()
    }
}

/// A fill notification from the account stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub qty: Qty,
    pub price: Price,
    pub position_side: PositionSide,
    /// Exchange order id the fill belongs to, when known.
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Hedge-mode position snapshot for one symbol, as reported by the
/// account stream. Ground truth: read by engine and strategy, written
/// only by the stream.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionBook {
    /// LONG leg quantity (non-negative).
    pub long: Qty,
    /// SHORT leg quantity (non-negative).
    pub short: Qty,
    /// One-way-mode signed quantity.
    pub both: Decimal,
}

impl PositionBook {
    pub fn is_flat(&self) -> bool {
        self.long.is_zero() && self.short.is_zero() && self.both.is_zero()
    }

    /// Net exposure: long - short + both.
    pub fn net(&self) -> Decimal {
        self.long.inner() - self.short.inner() + self.both
    }

    /// Gross exposure: long + short + |both|.
    pub fn gross(&self) -> Decimal {
        self.long.inner() + self.short.inner() + self.both.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_is_empty() {
        let q = Quote {
            bid_price: Price::new(dec!(99)),
            bid_qty: Qty::ZERO,
            ask_price: Price::new(dec!(101)),
            ask_qty: Qty::ZERO,
        };
        assert!(q.is_empty());

        let q2 = Quote {
            bid_qty: Qty::new(dec!(0.1)),
            ..q
        };
        assert!(!q2.is_empty());
    }

    #[test]
    fn test_position_book_net_gross() {
        let book = PositionBook {
            long: Qty::new(dec!(2)),
            short: Qty::new(dec!(0.5)),
            both: dec!(-1),
        };
        assert_eq!(book.net(), dec!(0.5));
        assert_eq!(book.gross(), dec!(3.5));
        assert!(!book.is_flat());
        assert!(PositionBook::default().is_flat());
    }
}
