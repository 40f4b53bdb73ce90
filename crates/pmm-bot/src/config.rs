//! Application configuration.
//!
//! Loaded once at startup from a TOML file, with `PMM_`-prefixed
//! environment variables overriding individual keys
//! (e.g. `PMM_EXCHANGE__API_KEY`).

use crate::error::{AppError, AppResult};
use pmm_core::{MarketSpec, Symbol};
use pmm_engine::ExchangeConfig;
use pmm_risk::RiskLimits;
use pmm_strategy::AsConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Orchestrator and engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Tick interval in seconds.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: f64,

    /// Cancel tracked orders older than this. Unset disables the TTL
    /// trigger.
    #[serde(default)]
    pub order_refresh_ttl_secs: Option<f64>,

    /// Cancel tracked orders drifted further than this from mid.
    /// Unset disables the deviation trigger. When neither trigger is
    /// configured the orchestrator cancel-alls before each requote.
    #[serde(default)]
    pub order_deviation_bps: Option<Decimal>,

    /// Minimum seconds between stale-order sweeps per symbol.
    #[serde(default = "default_min_cancel_interval_secs")]
    pub min_cancel_interval_secs: f64,

    /// Consecutive missing-mid ticks before quoting is blocked.
    #[serde(default = "default_mid_none_limit")]
    pub mid_none_limit: u32,

    /// Skip quoting when the account stream is older than this.
    #[serde(default = "default_account_stale_secs")]
    pub account_stale_secs: f64,

    /// Submit quotes with explicit LONG/SHORT position sides.
    #[serde(default = "default_true")]
    pub hedge_mode: bool,

    /// Strict markets mode: require pre-validated metadata for every
    /// traded symbol before any order is placed.
    #[serde(default)]
    pub strict_markets: bool,

    /// Market metadata file (TOML: symbol -> spec).
    #[serde(default)]
    pub markets_file: Option<String>,
}

fn default_tick_interval_secs() -> f64 {
    1.0
}

fn default_min_cancel_interval_secs() -> f64 {
    5.0
}

fn default_mid_none_limit() -> u32 {
    3
}

fn default_account_stale_secs() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            order_refresh_ttl_secs: None,
            order_deviation_bps: None,
            min_cancel_interval_secs: default_min_cancel_interval_secs(),
            mid_none_limit: default_mid_none_limit(),
            account_stale_secs: default_account_stale_secs(),
            hedge_mode: true,
            strict_markets: false,
            markets_file: None,
        }
    }
}

/// Risk limits plus flatten retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSection {
    pub per_symbol_limit: Decimal,
    pub global_limit: Decimal,
    pub flat_threshold: Decimal,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_flat_retries")]
    pub flat_retries: u32,
    #[serde(default = "default_flat_retry_backoff_secs")]
    pub flat_retry_backoff_secs: f64,
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_flat_retries() -> u32 {
    3
}

fn default_flat_retry_backoff_secs() -> f64 {
    1.0
}

impl RiskSection {
    pub fn limits(&self) -> RiskLimits {
        RiskLimits {
            per_symbol_limit: self.per_symbol_limit,
            global_limit: self.global_limit,
            flat_threshold: self.flat_threshold,
            cooldown_secs: self.cooldown_secs,
        }
    }
}

/// Telemetry output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySection {
    /// Append-only alert file; unset disables file alerts.
    #[serde(default = "default_alert_file")]
    pub alert_file: Option<String>,
}

fn default_alert_file() -> Option<String> {
    Some("alerts.log".to_string())
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            alert_file: default_alert_file(),
        }
    }
}

/// Paper feed settings (used when `exchange.name = "paper"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperSection {
    /// Feed emission interval in milliseconds.
    #[serde(default = "default_paper_feed_interval_ms")]
    pub feed_interval_ms: u64,
    /// Starting price per symbol; 100.0 when unset.
    #[serde(default)]
    pub start_prices: HashMap<String, f64>,
}

fn default_paper_feed_interval_ms() -> u64 {
    250
}

impl Default for PaperSection {
    fn default() -> Self {
        Self {
            feed_interval_ms: default_paper_feed_interval_ms(),
            start_prices: HashMap::new(),
        }
    }
}

/// One traded symbol with its strategy parameters.
///
/// An array of tables rather than a symbol-keyed map: the config
/// layer lowercases table keys, and exchange symbols are
/// case-sensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// Exchange symbol (e.g. "BTCUSDT").
    pub symbol: String,
    /// Avellaneda-Stoikov parameters for this symbol.
    pub strategy: AsConfig,
}

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub engine: EngineSection,
    pub risk: RiskSection,
    /// Traded symbols and their strategy parameters.
    pub symbols: Vec<SymbolConfig>,
    #[serde(default)]
    pub telemetry: TelemetrySection,
    #[serde(default)]
    pub paper: PaperSection,
}

impl AppConfig {
    /// Load from a TOML file with `PMM_` environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let cfg: AppConfig = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("PMM").separator("__"))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations that cannot trade safely.
    pub fn validate(&self) -> AppResult<()> {
        if self.symbols.is_empty() {
            return Err(AppError::InvalidConfig("no symbols configured".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.symbols {
            let symbol = &entry.symbol;
            let strat = &entry.strategy;
            if !seen.insert(symbol.clone()) {
                return Err(AppError::InvalidConfig(format!(
                    "duplicate symbol {symbol}"
                )));
            }
            if strat.gamma <= 0.0 {
                return Err(AppError::InvalidConfig(format!(
                    "{symbol}: gamma must be positive"
                )));
            }
            if strat.horizon <= 0.0 {
                return Err(AppError::InvalidConfig(format!(
                    "{symbol}: horizon must be positive"
                )));
            }
            if strat.max_inventory <= 0.0 {
                return Err(AppError::InvalidConfig(format!(
                    "{symbol}: max_inventory must be positive"
                )));
            }
            if strat.order_size <= 0.0 {
                return Err(AppError::InvalidConfig(format!(
                    "{symbol}: order_size must be positive"
                )));
            }
            if strat.order_levels == 0 {
                return Err(AppError::InvalidConfig(format!(
                    "{symbol}: order_levels must be at least 1"
                )));
            }
        }
        if self.risk.per_symbol_limit <= Decimal::ZERO
            || self.risk.global_limit <= Decimal::ZERO
            || self.risk.flat_threshold <= Decimal::ZERO
        {
            return Err(AppError::InvalidConfig(
                "risk limits must be positive".to_string(),
            ));
        }
        if self.engine.tick_interval_secs <= 0.0 {
            return Err(AppError::InvalidConfig(
                "tick_interval_secs must be positive".to_string(),
            ));
        }
        if self.engine.strict_markets && self.engine.markets_file.is_none() {
            return Err(AppError::InvalidConfig(
                "strict_markets requires markets_file".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured symbols, in declaration order.
    pub fn symbol_list(&self) -> Vec<Symbol> {
        self.symbols
            .iter()
            .map(|entry| Symbol::new(entry.symbol.clone()))
            .collect()
    }
}

/// Load per-symbol market specs from a pre-validated TOML file.
pub fn load_market_specs(path: &Path) -> AppResult<HashMap<Symbol, MarketSpec>> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: HashMap<String, MarketSpec> = toml::from_str(&raw)?;
    Ok(parsed
        .into_iter()
        .map(|(symbol, spec)| (Symbol::new(symbol), spec))
        .collect())
}
