//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the process-wide tracing subscriber.
///
/// Output format follows `RUST_ENV`: machine-parseable JSON lines in
/// production, pretty multi-line output everywhere else. The filter
/// defaults to `info,pmm=debug` and can be overridden with `RUST_LOG`.
/// Fails if a subscriber is already installed.
pub fn init_logging() -> TelemetryResult<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,pmm=debug"));

    let production = matches!(std::env::var("RUST_ENV").as_deref(), Ok("production"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if production {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().pretty().with_target(true))
            .try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
