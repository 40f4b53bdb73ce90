//! Error types for pmm-bot.

use thiserror::Error;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config load failed: {0}")]
    ConfigSource(#[from] ::config::ConfigError),

    #[error("market specs parse failed: {0}")]
    MarketSpecs(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] pmm_engine::EngineError),

    #[error(transparent)]
    Telemetry(#[from] pmm_telemetry::TelemetryError),
}

/// Result type alias for application operations.
pub type AppResult<T> = std::result::Result<T, AppError>;
