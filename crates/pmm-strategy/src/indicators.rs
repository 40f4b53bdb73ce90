//! Rolling market statistics: price volatility and order-flow intensity.
//!
//! Two small stateful structs with explicit `add_sample` /
//! `current_value` / `is_ready` methods. Until an indicator is ready,
//! callers must fall back to `SIGMA_FALLBACK` / `KAPPA_FALLBACK`
//! rather than zero: a zero volatility or kappa degenerates the
//! pricing formula (kappa sits in a denominator and inside
//! `ln(1 + gamma/kappa)`).

use std::collections::VecDeque;

/// Safe non-zero volatility before the estimator warms up.
pub const SIGMA_FALLBACK: f64 = 1e-4;

/// Safe positive order-book decay rate before the fit is available.
pub const KAPPA_FALLBACK: f64 = 1.5;

/// Trailing volatility estimator.
///
/// Ingests mid-price samples; once `sampling_length` samples are
/// buffered, `current_value` is the moving average (over
/// `processing_length` raw estimates) of the standard deviation of
/// successive price increments: volatility per sample interval, in
/// price units.
#[derive(Debug)]
pub struct VolatilityIndicator {
    sampling_length: usize,
    samples: VecDeque<f64>,
    processed: VecDeque<f64>,
    processing_length: usize,
}

impl VolatilityIndicator {
    pub fn new(sampling_length: usize, processing_length: usize) -> Self {
        Self {
            sampling_length: sampling_length.max(2),
            samples: VecDeque::with_capacity(sampling_length),
            processed: VecDeque::with_capacity(processing_length),
            processing_length: processing_length.max(1),
        }
    }

    /// Ingest one price sample.
    pub fn add_sample(&mut self, price: f64) {
        if !price.is_finite() || price <= 0.0 {
            return;
        }
        self.samples.push_back(price);
        while self.samples.len() > self.sampling_length {
            self.samples.pop_front();
        }

        if self.samples.len() >= 2 {
            let raw = stddev_of_diffs(&self.samples);
            self.processed.push_back(raw);
            while self.processed.len() > self.processing_length {
                self.processed.pop_front();
            }
        }
    }

    /// True once the sampling buffer is full.
    pub fn is_ready(&self) -> bool {
        self.samples.len() >= self.sampling_length
    }

    /// Smoothed volatility estimate; 0.0 until the first estimate.
    pub fn current_value(&self) -> f64 {
        if self.processed.is_empty() {
            return 0.0;
        }
        self.processed.iter().sum::<f64>() / self.processed.len() as f64
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

fn stddev_of_diffs(samples: &VecDeque<f64>) -> f64 {
    let diffs: Vec<f64> = samples
        .iter()
        .zip(samples.iter().skip(1))
        .map(|(a, b)| b - a)
        .collect();
    if diffs.is_empty() {
        return 0.0;
    }
    let mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
    let var = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / diffs.len() as f64;
    var.sqrt()
}

/// One retained trade observation: distance from mid and traded amount.
#[derive(Debug, Clone, Copy)]
struct TradeSample {
    distance: f64,
    amount: f64,
}

/// Order-flow intensity estimator.
///
/// Ingests `(mid, trade_price, trade_amount)` triples and fits an
/// exponential decay of arrival volume vs distance from mid,
/// `lambda(d) = alpha * exp(-kappa * d)`, by ordinary least squares on
/// `ln(lambda)` against `d`. `kappa` is the order-book depth factor.
#[derive(Debug)]
pub struct IntensityIndicator {
    sampling_length: usize,
    samples: VecDeque<TradeSample>,
    /// Rolling window of raw (alpha, kappa) fits.
    fits: VecDeque<(f64, f64)>,
    processing_length: usize,
    dirty: bool,
}

impl IntensityIndicator {
    pub fn new(sampling_length: usize, processing_length: usize) -> Self {
        Self {
            sampling_length: sampling_length.max(2),
            samples: VecDeque::with_capacity(sampling_length),
            fits: VecDeque::with_capacity(processing_length),
            processing_length: processing_length.max(1),
            dirty: false,
        }
    }

    /// Ingest one trade observation.
    pub fn add_sample(&mut self, mid: f64, trade_price: f64, trade_amount: f64) {
        if !mid.is_finite() || mid <= 0.0 || !trade_price.is_finite() || trade_amount <= 0.0 {
            return;
        }
        self.samples.push_back(TradeSample {
            distance: (trade_price - mid).abs(),
            amount: trade_amount,
        });
        while self.samples.len() > self.sampling_length {
            self.samples.pop_front();
        }
        self.dirty = true;
    }

    /// True once the sampling buffer is full.
    pub fn is_ready(&self) -> bool {
        self.samples.len() >= self.sampling_length
    }

    /// Current `(alpha, kappa)` estimate.
    ///
    /// `None` until the sampling buffer is full and a valid fit
    /// exists; callers fall back to `KAPPA_FALLBACK`.
    pub fn current_value(&mut self) -> Option<(f64, f64)> {
        if !self.is_ready() {
            return None;
        }
        if self.dirty {
            self.dirty = false;
            if let Some(fit) = fit_decay(&self.samples) {
                self.fits.push_back(fit);
                while self.fits.len() > self.processing_length {
                    self.fits.pop_front();
                }
            }
        }
        if self.fits.is_empty() {
            return None;
        }
        let n = self.fits.len() as f64;
        let alpha = self.fits.iter().map(|(a, _)| a).sum::<f64>() / n;
        let kappa = self.fits.iter().map(|(_, k)| k).sum::<f64>() / n;
        Some((alpha, kappa))
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

/// Fit `lambda(d) = alpha * exp(-kappa * d)` from the retained samples.
///
/// Amounts are aggregated per distance bucket, then `ln(amount)` is
/// regressed against distance. Requires at least two distinct
/// distances and a positive decay; otherwise no fit.
fn fit_decay(samples: &VecDeque<TradeSample>) -> Option<(f64, f64)> {
    use std::collections::BTreeMap;

    // Bucket distances at 1e-8 resolution to merge equal prints.
    let mut buckets: BTreeMap<i64, (f64, f64)> = BTreeMap::new();
    for s in samples {
        let key = (s.distance * 1e8).round() as i64;
        let entry = buckets.entry(key).or_insert((s.distance, 0.0));
        entry.1 += s.amount;
    }
    if buckets.len() < 2 {
        return None;
    }

    let points: Vec<(f64, f64)> = buckets
        .values()
        .filter(|(_, amount)| *amount > 0.0)
        .map(|(d, amount)| (*d, amount.ln()))
        .collect();
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
    let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
    let sum_xx: f64 = points.iter().map(|(x, _)| x * x).sum();
    let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;

    let kappa = -slope;
    let alpha = intercept.exp();
    if !kappa.is_finite() || kappa <= 0.0 || !alpha.is_finite() {
        return None;
    }
    Some((alpha, kappa))
}
