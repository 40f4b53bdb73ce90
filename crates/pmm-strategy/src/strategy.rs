//! Avellaneda-Stoikov quoting model.
//!
//! Produces reservation-price-centred, inventory-skewed multi-level
//! quotes. Inventory is carried as two hedge-mode legs
//! (`pos_long` / `pos_short`); the authoritative values arrive from the
//! account stream via `set_exchange_position` every tick, so local
//! state cannot drift from the exchange for more than one tick.

use crate::config::AsConfig;
use crate::indicators::{IntensityIndicator, VolatilityIndicator, KAPPA_FALLBACK, SIGMA_FALLBACK};
use pmm_core::{
    MarketSpec, OrderSide, PositionSide, Price, Qty, Quote, DEFAULT_PRICE_DECIMALS,
    DEFAULT_QTY_DECIMALS,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, trace};

/// Floor for remaining horizon time, to avoid degeneracy at the
/// horizon boundary.
const TIME_LEFT_EPS: f64 = 1e-4;

/// Reservation price: `r = mid - q * gamma * sigma * time_left`.
///
/// Inventory skew pushes the fair price away from mid in the direction
/// that discourages further accumulation.
pub fn reservation_price(mid: f64, q: f64, gamma: f64, sigma: f64, time_left: f64) -> f64 {
    mid - q * gamma * sigma * time_left
}

/// Optimal spread:
/// `delta = gamma * sigma * time_left + (2/gamma) * ln(1 + gamma/kappa)`,
/// floored at `mid * min_spread_ratio`.
pub fn optimal_spread(
    mid: f64,
    gamma: f64,
    sigma: f64,
    time_left: f64,
    kappa: f64,
    min_spread_ratio: f64,
) -> f64 {
    let raw = gamma * sigma * time_left + (2.0 / gamma) * (1.0 + gamma / kappa).ln();
    raw.max(mid * min_spread_ratio)
}

/// A resting order kept intentionally past normal refresh.
#[derive(Debug, Clone)]
struct HangingOrder {
    id: String,
    price: Price,
}

/// Per-symbol Avellaneda-Stoikov strategy state.
pub struct Strategy {
    cfg: AsConfig,
    price_decimals: u32,
    qty_decimals: u32,
    min_qty: Option<Qty>,
    vol: VolatilityIndicator,
    intensity: IntensityIndicator,
    pos_long: Decimal,
    pos_short: Decimal,
    /// Elapsed intra-horizon time.
    t: f64,
    last_mid: Option<f64>,
    last_reservation: Option<f64>,
    last_spread: Option<f64>,
    hanging: Vec<HangingOrder>,
}

impl Strategy {
    pub fn new(cfg: AsConfig) -> Self {
        let vol = VolatilityIndicator::new(cfg.vol_sampling_length, cfg.vol_processing_length);
        let intensity = IntensityIndicator::new(
            cfg.intensity_sampling_length,
            cfg.intensity_processing_length,
        );
        Self {
            cfg,
            price_decimals: DEFAULT_PRICE_DECIMALS,
            qty_decimals: DEFAULT_QTY_DECIMALS,
            min_qty: None,
            vol,
            intensity,
            pos_long: Decimal::ZERO,
            pos_short: Decimal::ZERO,
            t: 0.0,
            last_mid: None,
            last_reservation: None,
            last_spread: None,
            hanging: Vec::new(),
        }
    }

    /// Use exchange market metadata for rounding instead of defaults.
    pub fn set_market_spec(&mut self, spec: &MarketSpec) {
        self.price_decimals = spec.price_decimals;
        self.qty_decimals = spec.qty_decimals;
        self.min_qty = Some(spec.min_qty);
    }

    /// Feed a mid-price sample into the volatility estimator.
    pub fn update_price(&mut self, mid: Price) {
        let mid_f = mid.to_f64();
        self.vol.add_sample(mid_f);
        self.last_mid = Some(mid_f);
    }

    /// Feed a public trade print into the intensity estimator.
    ///
    /// When `mid` is absent the last seen mid is used.
    pub fn on_trade(&mut self, price: Price, qty: Qty, mid: Option<Price>) {
        let mid_f = match mid.map(|m| m.to_f64()).or(self.last_mid) {
            Some(m) => m,
            None => return,
        };
        self.intensity.add_sample(mid_f, price.to_f64(), qty.to_f64());
    }

    /// Apply a fill to the position legs, then clamp each leg to
    /// `[0, 2 * max_inventory]` and feed the trade to the intensity
    /// estimator.
    pub fn on_fill(&mut self, side: OrderSide, qty: Qty, price: Price, position_side: PositionSide) {
        let q = qty.inner().abs();
        match position_side {
            PositionSide::Long => match side {
                OrderSide::Buy => self.pos_long += q,
                OrderSide::Sell => self.pos_long -= q,
            },
            PositionSide::Short => match side {
                OrderSide::Sell => self.pos_short += q,
                OrderSide::Buy => self.pos_short -= q,
            },
            // One-way mode: a buy first closes short exposure, the
            // remainder opens long. A sell mirrors.
            PositionSide::Both => match side {
                OrderSide::Buy => {
                    let reduce = q.min(self.pos_short);
                    self.pos_short -= reduce;
                    self.pos_long += q - reduce;
                }
                OrderSide::Sell => {
                    let reduce = q.min(self.pos_long);
                    self.pos_long -= reduce;
                    self.pos_short += q - reduce;
                }
            },
        }
        self.clamp_legs();

        if let Some(mid) = self.last_mid {
            self.intensity.add_sample(mid, price.to_f64(), qty.to_f64());
        }

        trace!(
            side = %side,
            position_side = %position_side,
            qty = %qty,
            pos_long = %self.pos_long,
            pos_short = %self.pos_short,
            "fill applied"
        );
    }

    /// Authoritative position overwrite from the account stream.
    ///
    /// Exchange truth is not clamped: if the exchange reports more
    /// inventory than the local cap, risk must see it.
    pub fn set_exchange_position(&mut self, long: Qty, short: Qty) {
        self.pos_long = long.inner().max(Decimal::ZERO);
        self.pos_short = short.inner().max(Decimal::ZERO);
    }

    /// Zero both legs. Called only after a fully successful flatten.
    pub fn reset_inventory(&mut self) {
        self.pos_long = Decimal::ZERO;
        self.pos_short = Decimal::ZERO;
    }

    fn clamp_legs(&mut self) {
        let cap = Decimal::from_f64_retain(2.0 * self.cfg.max_inventory)
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO);
        self.pos_long = self.pos_long.clamp(Decimal::ZERO, cap);
        self.pos_short = self.pos_short.clamp(Decimal::ZERO, cap);
    }

    /// Advance the intra-horizon clock; wraps to 0 at the horizon.
    pub fn tick(&mut self, dt: f64) {
        self.t += dt;
        if self.t >= self.cfg.horizon {
            self.t = 0.0;
        }
    }

    /// Quoting is allowed only once the volatility buffer is full.
    pub fn is_ready(&self) -> bool {
        self.vol.is_ready()
    }

    /// Net inventory: `pos_long - pos_short`.
    pub fn inventory(&self) -> Decimal {
        self.pos_long - self.pos_short
    }

    /// Absolute inventory notional at `mid`.
    pub fn notional(&self, mid: Price) -> Decimal {
        (self.inventory() * mid.inner()).abs()
    }

    /// Last computed reservation price, for observability.
    pub fn last_reservation(&self) -> Option<f64> {
        self.last_reservation
    }

    /// Last computed optimal spread, for observability.
    pub fn last_spread(&self) -> Option<f64> {
        self.last_spread
    }

    /// Compute one `Quote` per configured level.
    ///
    /// Empty before indicator readiness (no orders while warming up)
    /// and for non-positive mids.
    pub fn get_quotes(&mut self, mid: Price) -> Vec<Quote> {
        if !self.is_ready() {
            return Vec::new();
        }
        let mid_f = mid.to_f64();
        if mid_f <= 0.0 {
            return Vec::new();
        }

        let sigma = self.vol.current_value().max(SIGMA_FALLBACK);
        let kappa = self
            .intensity
            .current_value()
            .map(|(_, k)| k)
            .filter(|k| *k > 0.0)
            .unwrap_or(KAPPA_FALLBACK);

        let inv = self.inventory().to_f64().unwrap_or(0.0);
        let target = self.cfg.max_inventory * (self.cfg.inventory_target_pct / 100.0 - 0.5) * 2.0;
        let q = (inv - target) / self.cfg.max_inventory;
        let inv_ratio = inv / self.cfg.max_inventory;
        let time_left = (self.cfg.horizon - self.t).max(TIME_LEFT_EPS);

        let r = reservation_price(mid_f, q, self.cfg.gamma, sigma, time_left);
        let delta = optimal_spread(
            mid_f,
            self.cfg.gamma,
            sigma,
            time_left,
            kappa,
            self.cfg.min_spread_ratio(),
        );
        self.last_reservation = Some(r);
        self.last_spread = Some(delta);

        let half = delta / 2.0;
        let step = half / 100.0 * self.cfg.level_distances;
        let fee = if self.cfg.fee_compensation {
            mid_f * self.cfg.maker_fee_rate
        } else {
            0.0
        };

        let bid_shape = (1.0 - inv_ratio).clamp(0.0, 1.5);
        let ask_shape = (1.0 + inv_ratio).clamp(0.0, 1.5);
        // Damp the side that would grow the existing position.
        let (bid_damp, ask_damp) = if self.cfg.eta > 0.0 {
            if q > 0.0 {
                ((-self.cfg.eta * q).exp(), 1.0)
            } else if q < 0.0 {
                (1.0, (self.cfg.eta * q).exp())
            } else {
                (1.0, 1.0)
            }
        } else {
            (1.0, 1.0)
        };

        let mut quotes = Vec::with_capacity(self.cfg.order_levels as usize);
        for level in 0..self.cfg.order_levels {
            let offset = half + level as f64 * step;
            let bid_raw = r - offset - fee;
            let ask_raw = r + offset + fee;

            let scale = 1.0 / (level + 1) as f64;
            let bid_qty_raw = self.cfg.order_size * bid_shape * bid_damp * scale;
            let ask_qty_raw = self.cfg.order_size * ask_shape * ask_damp * scale;

            let bid_price = Price::from_f64(bid_raw, self.price_decimals).unwrap_or(Price::ZERO);
            let ask_price = Price::from_f64(ask_raw, self.price_decimals).unwrap_or(Price::ZERO);

            let mut bid_qty = self.round_qty(bid_qty_raw);
            let ask_qty = self.round_qty(ask_qty_raw);
            if !bid_price.is_positive() {
                bid_qty = Qty::ZERO;
            }

            quotes.push(Quote {
                bid_price,
                bid_qty,
                ask_price,
                ask_qty,
            });
        }

        debug!(
            mid = mid_f,
            reservation = r,
            spread = delta,
            sigma,
            kappa,
            q,
            levels = quotes.len(),
            "quotes computed"
        );

        quotes
    }

    fn round_qty(&self, qty: f64) -> Qty {
        let rounded = Qty::from_f64(qty.max(0.0), self.qty_decimals).unwrap_or(Qty::ZERO);
        match self.min_qty {
            Some(min) if rounded < min => Qty::ZERO,
            _ => rounded,
        }
    }

    /// Record a hanging order for drift tracking.
    pub fn add_hanging_order(&mut self, id: String, price: Price) {
        if self.cfg.hanging_orders_enabled {
            self.hanging.push(HangingOrder { id, price });
        }
    }

    /// Hanging orders whose price drifted beyond
    /// `hanging_orders_cancel_pct` from `mid`.
    pub fn hanging_orders_to_cancel(&self, mid: Price) -> Vec<String> {
        let mid_f = mid.to_f64();
        if mid_f <= 0.0 {
            return Vec::new();
        }
        self.hanging
            .iter()
            .filter(|h| {
                let drift_pct = (h.price.to_f64() - mid_f).abs() / mid_f * 100.0;
                drift_pct > self.cfg.hanging_orders_cancel_pct
            })
            .map(|h| h.id.clone())
            .collect()
    }

    /// Forget a hanging order (cancelled or filled).
    pub fn drop_hanging_order(&mut self, id: &str) {
        self.hanging.retain(|h| h.id != id);
    }

    /// Number of tracked hanging orders.
    pub fn hanging_order_count(&self) -> usize {
        self.hanging.len()
    }
}
