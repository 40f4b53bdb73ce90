//! Simulated feed for paper-trading runs.
//!
//! Emits a random-walk mid plus occasional trade prints per symbol, and
//! a periodic flat position snapshot so the account stream never reads
//! as stale. Lets the whole quoting loop run end-to-end without
//! exchange credentials.

use crate::events::{AccountEvent, FeedEvent, MarketEvent};
use pmm_core::{Price, Qty, Symbol};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Random-walk market simulator.
pub struct PaperFeed {
    symbols: Vec<(Symbol, f64)>,
    tick_interval: Duration,
    price_decimals: u32,
}

impl PaperFeed {
    /// `symbols` pairs each symbol with its starting price.
    pub fn new(symbols: Vec<(Symbol, f64)>, tick_interval: Duration, price_decimals: u32) -> Self {
        Self {
            symbols,
            tick_interval,
            price_decimals,
        }
    }

    /// Run until the receiver side closes.
    pub async fn run(self, tx: mpsc::Sender<FeedEvent>) {
        info!(
            symbols = self.symbols.len(),
            interval_ms = self.tick_interval.as_millis() as u64,
            "paper feed started"
        );

        let mut rng = SmallRng::from_entropy();
        let mut prices: Vec<f64> = self.symbols.iter().map(|(_, p)| *p).collect();
        let mut interval = tokio::time::interval(self.tick_interval);
        let mut ticks: u64 = 0;

        loop {
            interval.tick().await;
            ticks += 1;

            for (i, (symbol, _)) in self.symbols.iter().enumerate() {
                // ~2 bps per-step random walk
                let step = rng.gen_range(-0.0002..0.0002);
                prices[i] *= 1.0 + step;

                let mid = match Price::from_f64(prices[i], self.price_decimals) {
                    Some(p) => p,
                    None => continue,
                };

                if tx
                    .send(FeedEvent::Market(MarketEvent::Mid {
                        symbol: symbol.clone(),
                        mid,
                    }))
                    .await
                    .is_err()
                {
                    debug!("feed channel closed, paper feed stopping");
                    return;
                }

                // Occasional trade print near the mid.
                if rng.gen_bool(0.3) {
                    let trade_px = prices[i] * (1.0 + rng.gen_range(-0.0005..0.0005));
                    let qty = rng.gen_range(0.01..0.5);
                    let event = match (
                        Price::from_f64(trade_px, self.price_decimals),
                        Qty::from_f64(qty, 4),
                    ) {
                        (Some(price), Some(qty)) => FeedEvent::Market(MarketEvent::Trade {
                            symbol: symbol.clone(),
                            price,
                            qty,
                        }),
                        _ => continue,
                    };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }

            // Heartbeat the account stream with a flat snapshot.
            if ticks % 10 == 0
                && tx
                    .send(FeedEvent::Account(AccountEvent::Positions(HashMap::new())))
                    .await
                    .is_err()
            {
                return;
            }
        }
    }
}
