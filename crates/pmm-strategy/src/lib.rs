//! Avellaneda-Stoikov quoting strategy.
//!
//! # Architecture
//!
//! ```text
//! mid updates  → VolatilityIndicator ┐
//! trade prints → IntensityIndicator  ├─ Strategy::get_quotes(mid)
//! fills        → position legs       ┘      ↓
//!                                    one Quote per configured level
//! ```
//!
//! Model math runs in f64 (ln/exp/sqrt); prices and quantities cross
//! back into decimals at the quote boundary.

pub mod config;
pub mod indicators;
pub mod strategy;

pub use config::AsConfig;
pub use indicators::{IntensityIndicator, VolatilityIndicator, KAPPA_FALLBACK, SIGMA_FALLBACK};
pub use strategy::{optimal_spread, reservation_price, Strategy};
