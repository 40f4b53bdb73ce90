//! Prometheus metrics for the market-making engine.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally: a registration
//! failure means duplicate metric names, which is a fatal configuration
//! error best surfaced at startup. These panics only occur during
//! static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, Counter, CounterVec, GaugeVec,
};

/// Orders successfully placed, by symbol and side.
pub static ORDERS_PLACED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_orders_placed_total",
        "Orders successfully placed",
        &["symbol", "side"]
    )
    .unwrap()
});

/// Quote legs that failed to submit, by symbol and side.
pub static ORDER_LEG_FAILED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_order_leg_failed_total",
        "Quote legs that failed submission",
        &["symbol", "side"]
    )
    .unwrap()
});

/// Cancel operations, by symbol and trigger.
pub static CANCELS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_cancels_total",
        "Cancel operations by trigger",
        &["symbol", "trigger"]
    )
    .unwrap()
});

/// Rate-limit-shaped exchange errors.
pub static RATE_LIMITED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "pmm_rate_limited_total",
        "Rate-limit-shaped exchange errors"
    )
    .unwrap()
});

/// Flatten attempts that exhausted their retries, by symbol.
pub static FLAT_FAILURE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_flat_failure_total",
        "Flatten attempts that exhausted retries",
        &["symbol"]
    )
    .unwrap()
});

/// Risk manager transitions, by symbol and action.
pub static RISK_ACTION_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_risk_action_total",
        "Risk manager transitions",
        &["symbol", "action"]
    )
    .unwrap()
});

/// Fills applied to strategy state, by symbol and side.
pub static FILLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_fills_total",
        "Fills applied to strategy state",
        &["symbol", "side"]
    )
    .unwrap()
});

/// Quote-blocked state per symbol (1 = blocked on missing mid).
pub static QUOTE_BLOCKED: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pmm_quote_blocked",
        "Quote-blocked state (1=blocked on missing mid)",
        &["symbol"]
    )
    .unwrap()
});

/// Ticks skipped because the account stream was stale, by symbol.
pub static ACCOUNT_STALE_SKIPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_account_stale_skips_total",
        "Ticks skipped on stale account stream",
        &["symbol"]
    )
    .unwrap()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        // Touch every lazy so duplicate registration would panic here.
        ORDERS_PLACED_TOTAL
            .with_label_values(&["BTCUSDT", "buy"])
            .inc();
        ORDER_LEG_FAILED_TOTAL
            .with_label_values(&["BTCUSDT", "sell"])
            .inc();
        CANCELS_TOTAL
            .with_label_values(&["BTCUSDT", "stale"])
            .inc();
        RATE_LIMITED_TOTAL.inc();
        FLAT_FAILURE_TOTAL.with_label_values(&["BTCUSDT"]).inc();
        RISK_ACTION_TOTAL
            .with_label_values(&["BTCUSDT", "pause"])
            .inc();
        FILLS_TOTAL.with_label_values(&["BTCUSDT", "buy"]).inc();
        QUOTE_BLOCKED.with_label_values(&["BTCUSDT"]).set(1.0);
        ACCOUNT_STALE_SKIPS_TOTAL
            .with_label_values(&["BTCUSDT"])
            .inc();

        assert!(RATE_LIMITED_TOTAL.get() >= 1.0);
    }
}
