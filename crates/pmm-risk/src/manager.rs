//! Risk state machine over notional exposure.

use chrono::{DateTime, Duration, Utc};
use pmm_core::Symbol;
use pmm_telemetry::{metrics, AlertSink, Severity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Verdict for one symbol on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskAction {
    /// Quoting allowed.
    Ok,
    /// Symbol is cooling down; skip quoting this tick.
    Pause,
    /// Exposure breached the flat threshold: cancel and flatten.
    Flat,
    /// The whole book is cooling down.
    GlobalPause,
}

impl fmt::Display for RiskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Pause => write!(f, "pause"),
            Self::Flat => write!(f, "flat"),
            Self::GlobalPause => write!(f, "global_pause"),
        }
    }
}

/// Notional limits and cooldown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Per-symbol notional limit (quote currency).
    pub per_symbol_limit: Decimal,
    /// Whole-book notional limit.
    pub global_limit: Decimal,
    /// Per-symbol notional beyond which the position is flattened.
    pub flat_threshold: Decimal,
    /// Cooldown length in seconds. A flat pause lasts 3x this.
    pub cooldown_secs: u64,
}

#[derive(Debug, Default)]
struct RiskState {
    paused_until: Option<DateTime<Utc>>,
}

impl RiskState {
    fn is_paused(&self, now: DateTime<Utc>) -> bool {
        matches!(self.paused_until, Some(until) if now < until)
    }
}

/// Per-symbol risk states plus one global state; the global one
/// dominates and is always checked first.
pub struct RiskManager {
    limits: RiskLimits,
    states: HashMap<Symbol, RiskState>,
    global: RiskState,
    alerts: Arc<AlertSink>,
}

impl RiskManager {
    pub fn new(limits: RiskLimits, alerts: Arc<AlertSink>) -> Self {
        Self {
            limits,
            states: HashMap::new(),
            global: RiskState::default(),
            alerts,
        }
    }

    /// Evaluate one symbol against current exposure, at wall-clock now.
    pub fn check(&mut self, symbol: &Symbol, notional: Decimal, total_notional: Decimal) -> RiskAction {
        self.check_at(symbol, notional, total_notional, Utc::now())
    }

    /// Evaluate at an explicit clock (tests drive this directly).
    ///
    /// Re-checking an already-paused symbol does not extend its
    /// cooldown; the original `paused_until` stands.
    pub fn check_at(
        &mut self,
        symbol: &Symbol,
        notional: Decimal,
        total_notional: Decimal,
        now: DateTime<Utc>,
    ) -> RiskAction {
        let cooldown = Duration::seconds(self.limits.cooldown_secs as i64);

        let action = if self.global.is_paused(now) {
            RiskAction::GlobalPause
        } else if total_notional > self.limits.global_limit {
            self.global.paused_until = Some(now + cooldown);
            self.alerts.alert(
                Severity::Critical,
                "global notional limit breached",
                &[
                    ("total_notional", total_notional.to_string()),
                    ("limit", self.limits.global_limit.to_string()),
                ],
            );
            RiskAction::GlobalPause
        } else if self.states.entry(symbol.clone()).or_default().is_paused(now) {
            RiskAction::Pause
        } else if notional > self.limits.flat_threshold {
            let state = self.states.entry(symbol.clone()).or_default();
            state.paused_until = Some(now + cooldown * 3);
            self.alerts.alert(
                Severity::Critical,
                "flat threshold breached, forcing position flat",
                &[
                    ("symbol", symbol.to_string()),
                    ("notional", notional.to_string()),
                    ("threshold", self.limits.flat_threshold.to_string()),
                ],
            );
            RiskAction::Flat
        } else if notional > self.limits.per_symbol_limit {
            let state = self.states.entry(symbol.clone()).or_default();
            state.paused_until = Some(now + cooldown);
            self.alerts.alert(
                Severity::Warn,
                "per-symbol notional limit breached",
                &[
                    ("symbol", symbol.to_string()),
                    ("notional", notional.to_string()),
                    ("limit", self.limits.per_symbol_limit.to_string()),
                ],
            );
            RiskAction::Pause
        } else {
            RiskAction::Ok
        };

        if action != RiskAction::Ok {
            warn!(symbol = %symbol, action = %action, %notional, %total_notional, "risk action");
            metrics::RISK_ACTION_TOTAL
                .with_label_values(&[symbol.as_str(), &action.to_string()])
                .inc();
        }

        action
    }

    /// Whether a symbol is currently in cooldown (global included).
    pub fn is_paused(&self, symbol: &Symbol, now: DateTime<Utc>) -> bool {
        self.global.is_paused(now)
            || self
                .states
                .get(symbol)
                .map(|s| s.is_paused(now))
                .unwrap_or(false)
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limits() -> RiskLimits {
        RiskLimits {
            per_symbol_limit: dec!(200),
            global_limit: dec!(2000),
            flat_threshold: dec!(400),
            cooldown_secs: 10,
        }
    }

    fn manager() -> RiskManager {
        RiskManager::new(limits(), Arc::new(AlertSink::disabled()))
    }

    fn btc() -> Symbol {
        Symbol::from("BTCUSDT")
    }

    #[test]
    fn test_ok_below_all_limits() {
        let mut rm = manager();
        let now = Utc::now();
        assert_eq!(rm.check_at(&btc(), dec!(100), dec!(100), now), RiskAction::Ok);
        assert!(!rm.is_paused(&btc(), now));
    }

    #[test]
    fn test_per_symbol_breach_pauses_for_cooldown() {
        let mut rm = manager();
        let now = Utc::now();
        assert_eq!(
            rm.check_at(&btc(), dec!(250), dec!(250), now),
            RiskAction::Pause
        );

        // Within the 10s cooldown the symbol stays paused regardless
        // of notional.
        let later = now + Duration::seconds(5);
        assert_eq!(rm.check_at(&btc(), dec!(1), dec!(1), later), RiskAction::Pause);

        // After cooldown it recovers.
        let after = now + Duration::seconds(11);
        assert_eq!(rm.check_at(&btc(), dec!(1), dec!(1), after), RiskAction::Ok);
    }

    #[test]
    fn test_flat_threshold_pauses_three_cooldowns() {
        let mut rm = manager();
        let now = Utc::now();
        assert_eq!(
            rm.check_at(&btc(), dec!(450), dec!(450), now),
            RiskAction::Flat
        );

        // Still paused after one and two cooldowns...
        assert_eq!(
            rm.check_at(&btc(), dec!(1), dec!(1), now + Duration::seconds(15)),
            RiskAction::Pause
        );
        assert_eq!(
            rm.check_at(&btc(), dec!(1), dec!(1), now + Duration::seconds(29)),
            RiskAction::Pause
        );
        // ...recovered after 3x cooldown.
        assert_eq!(
            rm.check_at(&btc(), dec!(1), dec!(1), now + Duration::seconds(31)),
            RiskAction::Ok
        );
    }

    #[test]
    fn test_global_breach_dominates_small_symbol() {
        let mut rm = manager();
        let now = Utc::now();
        let eth = Symbol::from("ETHUSDT");

        // ETH's own notional is tiny but the book breaches the global
        // limit.
        assert_eq!(
            rm.check_at(&eth, dec!(50), dec!(2500), now),
            RiskAction::GlobalPause
        );

        // Every symbol is blocked while the global pause holds, even
        // with a flat book.
        assert_eq!(
            rm.check_at(&btc(), dec!(0), dec!(0), now + Duration::seconds(5)),
            RiskAction::GlobalPause
        );

        // Global pause lifts after one cooldown.
        assert_eq!(
            rm.check_at(&btc(), dec!(0), dec!(0), now + Duration::seconds(11)),
            RiskAction::Ok
        );
    }

    #[test]
    fn test_global_checked_before_symbol_state() {
        let mut rm = manager();
        let now = Utc::now();

        // Pause BTC locally first.
        rm.check_at(&btc(), dec!(250), dec!(250), now);
        // Then breach the global limit via another symbol.
        rm.check_at(&Symbol::from("ETHUSDT"), dec!(50), dec!(2500), now);

        // BTC now reports the global pause, not its local one.
        assert_eq!(
            rm.check_at(&btc(), dec!(1), dec!(1), now + Duration::seconds(1)),
            RiskAction::GlobalPause
        );
    }

    #[test]
    fn test_recheck_does_not_extend_pause() {
        let mut rm = manager();
        let now = Utc::now();
        rm.check_at(&btc(), dec!(250), dec!(250), now);

        // Re-checks inside the window return Pause without pushing
        // paused_until forward.
        rm.check_at(&btc(), dec!(250), dec!(250), now + Duration::seconds(9));
        assert_eq!(
            rm.check_at(&btc(), dec!(1), dec!(1), now + Duration::seconds(11)),
            RiskAction::Ok
        );
    }

    #[test]
    fn test_exact_limit_is_not_a_breach() {
        let mut rm = manager();
        let now = Utc::now();
        // Limits are strict inequalities.
        assert_eq!(
            rm.check_at(&btc(), dec!(200), dec!(200), now),
            RiskAction::Ok
        );
        assert_eq!(
            rm.check_at(&btc(), dec!(400), dec!(2000), now),
            RiskAction::Pause
        );
    }

    #[test]
    fn test_symbols_pause_independently() {
        let mut rm = manager();
        let now = Utc::now();
        let eth = Symbol::from("ETHUSDT");

        rm.check_at(&btc(), dec!(250), dec!(300), now);
        assert_eq!(rm.check_at(&eth, dec!(50), dec!(300), now), RiskAction::Ok);
    }
}
