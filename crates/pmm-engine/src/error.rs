//! Error types for pmm-engine.

use crate::exchange::ExchangeError;
use thiserror::Error;

/// Engine error types.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("unknown exchange '{0}'")]
    UnknownExchange(String),

    #[error("http client build failed: {0}")]
    HttpClient(String),

    #[error("market metadata incomplete for {symbol}: {reason}")]
    InvalidMarket { symbol: String, reason: String },

    #[error("no market metadata loaded for {0}")]
    MissingMarket(String),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
