//! Telemetry for the market-making engine.
//!
//! - `init_logging`: tracing subscriber setup (JSON in production)
//! - `AlertSink`: append-only alert file that never blocks trading
//! - `metrics`: Prometheus counters and gauges

pub mod alerts;
pub mod error;
pub mod logging;
pub mod metrics;

pub use alerts::{AlertSink, Severity};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
