//! Per-symbol strategy parameters.
//!
//! Loaded once at startup, never mutated at runtime.

use serde::{Deserialize, Serialize};

/// Avellaneda-Stoikov parameters for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsConfig {
    /// Risk aversion (gamma). Higher = wider spreads under inventory.
    pub gamma: f64,

    /// Quoting horizon T, in the same unit as `tick(dt)` advances.
    pub horizon: f64,

    /// Maximum inventory per leg, in base units.
    pub max_inventory: f64,

    /// Base order size per quote, in base units.
    pub order_size: f64,

    /// Target inventory as a percentage of max (50 = flat).
    #[serde(default = "default_inventory_target_pct")]
    pub inventory_target_pct: f64,

    /// Minimum spread as a ratio of mid (used when `min_spread_bps`
    /// is not set).
    #[serde(default)]
    pub min_spread: f64,

    /// Minimum spread in basis points; takes precedence over
    /// `min_spread` when set.
    #[serde(default)]
    pub min_spread_bps: Option<f64>,

    /// Number of quote levels per side.
    #[serde(default = "default_order_levels")]
    pub order_levels: u32,

    /// Level spacing multiplier: step = (half_spread / 100) * level_distances.
    #[serde(default = "default_level_distances")]
    pub level_distances: f64,

    /// Compensate quotes for maker fees.
    #[serde(default)]
    pub fee_compensation: bool,

    /// Maker fee rate (e.g. 0.0002 = 2 bps), applied when
    /// `fee_compensation` is on.
    #[serde(default)]
    pub maker_fee_rate: f64,

    /// Quantity-shape exponent eta; 0 disables size reshaping.
    #[serde(default)]
    pub eta: f64,

    /// Track hanging orders and cancel them on price drift.
    #[serde(default)]
    pub hanging_orders_enabled: bool,

    /// Drift from mid (as a percentage, e.g. 1.0 = 1%) beyond which a
    /// hanging order is cancelled.
    #[serde(default = "default_hanging_orders_cancel_pct")]
    pub hanging_orders_cancel_pct: f64,

    /// Volatility indicator sampling buffer length.
    #[serde(default = "default_vol_sampling_length")]
    pub vol_sampling_length: usize,

    /// Volatility indicator smoothing window length.
    #[serde(default = "default_vol_processing_length")]
    pub vol_processing_length: usize,

    /// Intensity indicator sampling buffer length.
    #[serde(default = "default_intensity_sampling_length")]
    pub intensity_sampling_length: usize,

    /// Intensity indicator smoothing window length.
    #[serde(default = "default_intensity_processing_length")]
    pub intensity_processing_length: usize,
}

fn default_inventory_target_pct() -> f64 {
    50.0
}

fn default_order_levels() -> u32 {
    1
}

fn default_level_distances() -> f64 {
    1.0
}

fn default_hanging_orders_cancel_pct() -> f64 {
    1.0
}

fn default_vol_sampling_length() -> usize {
    100
}

fn default_vol_processing_length() -> usize {
    20
}

fn default_intensity_sampling_length() -> usize {
    200
}

fn default_intensity_processing_length() -> usize {
    20
}

impl AsConfig {
    /// Effective minimum spread as a ratio of mid.
    pub fn min_spread_ratio(&self) -> f64 {
        match self.min_spread_bps {
            Some(bps) => bps / 10_000.0,
            None => self.min_spread,
        }
    }
}

impl Default for AsConfig {
    fn default() -> Self {
        Self {
            gamma: 0.1,
            horizon: 1.0,
            max_inventory: 1.0,
            order_size: 0.1,
            inventory_target_pct: default_inventory_target_pct(),
            min_spread: 0.0,
            min_spread_bps: None,
            order_levels: default_order_levels(),
            level_distances: default_level_distances(),
            fee_compensation: false,
            maker_fee_rate: 0.0,
            eta: 0.0,
            hanging_orders_enabled: false,
            hanging_orders_cancel_pct: default_hanging_orders_cancel_pct(),
            vol_sampling_length: default_vol_sampling_length(),
            vol_processing_length: default_vol_processing_length(),
            intensity_sampling_length: default_intensity_sampling_length(),
            intensity_processing_length: default_intensity_processing_length(),
        }
    }
}
