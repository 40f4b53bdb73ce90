//! Order engine and exchange adapters.
//!
//! The `Engine` owns the order lifecycle: quote placement, cancels,
//! staleness-based requoting, pending-notional accounting, and forced
//! position flattening with retry. Exchange connectivity sits behind
//! the `ExchangeClient` trait; concrete adapters (`PaperExchange`,
//! `BinanceFutures`) are selected by configuration at startup.

pub mod binance;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod paper;

pub use engine::{Engine, EngineSettings};
pub use error::{EngineError, EngineResult};
pub use exchange::{
    build_client, ExchangeClient, ExchangeConfig, ExchangeError, OrderParams,
};
pub use paper::PaperExchange;
