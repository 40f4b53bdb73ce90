//! Core domain types for the perpetual-futures market-making engine.
//!
//! This crate provides the fundamental types shared across the workspace:
//! - `Symbol`: trading pair identifier
//! - `Price`, `Qty`: precision-safe numeric types
//! - `Order`, `Quote`, `Fill`: order lifecycle data
//! - `PositionBook`: hedge-mode position snapshot
//! - `MarketSpec`: per-symbol exchange metadata (precision, limits)

pub mod decimal;
pub mod error;
pub mod market;
pub mod order;
pub mod types;

pub use decimal::{Price, Qty};
pub use error::{CoreError, Result};
pub use market::{MarketSpec, Symbol, DEFAULT_PRICE_DECIMALS, DEFAULT_QTY_DECIMALS};
pub use order::{ClientOrderId, Order, OrderSide, PositionSide, TimeInForce};
pub use types::{Fill, PositionBook, Quote};
