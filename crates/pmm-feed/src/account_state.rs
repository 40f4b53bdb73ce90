//! Last-known account state: positions and stream freshness.

use parking_lot::RwLock;
use pmm_core::{PositionBook, Symbol};
use std::collections::HashMap;
use std::time::Instant;

/// Position snapshot store with a staleness clock.
///
/// Written only by the account-stream applier; the engine and
/// orchestrator read it as ground truth.
#[derive(Default)]
pub struct AccountState {
    positions: RwLock<HashMap<Symbol, PositionBook>>,
    last_update: RwLock<Option<Instant>>,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the position snapshot and refresh the staleness clock.
    ///
    /// Symbols absent from the new snapshot are treated as flat, so a
    /// closed position cannot linger locally.
    pub fn apply_snapshot(&self, snapshot: HashMap<Symbol, PositionBook>) {
        *self.positions.write() = snapshot;
        *self.last_update.write() = Some(Instant::now());
    }

    /// Refresh only the staleness clock (heartbeat without payload).
    pub fn touch(&self) {
        *self.last_update.write() = Some(Instant::now());
    }

    /// Position book for a symbol; flat if unknown.
    pub fn position(&self, symbol: &Symbol) -> PositionBook {
        self.positions
            .read()
            .get(symbol)
            .copied()
            .unwrap_or_default()
    }

    /// Seconds since the last account-stream update (monotonic).
    ///
    /// `None` means no update has ever arrived, which callers must
    /// treat as stale.
    pub fn secs_since_update(&self) -> Option<f64> {
        self.last_update.read().map(|t| t.elapsed().as_secs_f64())
    }
}
