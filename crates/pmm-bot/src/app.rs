//! Main orchestration: the per-symbol tick loop.
//!
//! Each tick, per symbol: read feed state, sync the exchange position
//! into the strategy, risk-check, then refresh and place quotes.
//! Symbols are processed concurrently in a `JoinSet`; within one
//! symbol the sequence "sync position -> compute quotes -> risk-check
//! -> requote" is strictly sequential. A failure in one symbol's task
//! never prevents the others from being processed.

use crate::config::AppConfig;
use crate::error::AppResult;
use parking_lot::Mutex;
use pmm_core::Symbol;
use pmm_engine::Engine;
use pmm_feed::{AccountEvent, AccountState, FeedEvent, MarketEvent, MarketState};
use pmm_risk::{RiskAction, RiskManager};
use pmm_strategy::Strategy;
use pmm_telemetry::metrics;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Strategy horizons are expressed in days.
const DAY_SECS: f64 = 86_400.0;

/// Per-symbol mutable orchestration state.
struct SymbolSlot {
    strategy: Strategy,
    mid_misses: u32,
    quote_blocked: bool,
    hanging_enabled: bool,
}

/// Shared per-tick dependencies handed to symbol tasks.
struct TickDeps {
    engine: Arc<Engine>,
    market: Arc<MarketState>,
    account: Arc<AccountState>,
    risk: Arc<Mutex<RiskManager>>,
    cfg: Arc<AppConfig>,
}

/// The tick-loop orchestrator.
pub struct MarketMaker {
    deps: Arc<TickDeps>,
    slots: HashMap<Symbol, Arc<tokio::sync::Mutex<SymbolSlot>>>,
    symbols: Vec<Symbol>,
    tick_interval: Duration,
}

impl MarketMaker {
    pub fn new(
        cfg: Arc<AppConfig>,
        engine: Arc<Engine>,
        market: Arc<MarketState>,
        account: Arc<AccountState>,
        risk: Arc<Mutex<RiskManager>>,
    ) -> Self {
        let mut slots = HashMap::new();
        for entry in &cfg.symbols {
            let symbol = Symbol::new(entry.symbol.clone());
            let mut strategy = Strategy::new(entry.strategy.clone());
            if let Some(spec) = engine.spec_for(&symbol) {
                strategy.set_market_spec(spec);
            }
            slots.insert(
                symbol,
                Arc::new(tokio::sync::Mutex::new(SymbolSlot {
                    strategy,
                    mid_misses: 0,
                    quote_blocked: false,
                    hanging_enabled: entry.strategy.hanging_orders_enabled,
                })),
            );
        }

        let symbols = cfg.symbol_list();
        let tick_interval = Duration::from_secs_f64(cfg.engine.tick_interval_secs);

        Self {
            deps: Arc::new(TickDeps {
                engine,
                market,
                account,
                risk,
                cfg,
            }),
            slots,
            symbols,
            tick_interval,
        }
    }

    /// Startup hygiene: validate metadata in strict mode, then
    /// cancel-all + flatten every symbol so the engine never starts
    /// holding unmanaged state.
    pub async fn startup(&self) -> AppResult<()> {
        if self.deps.cfg.engine.strict_markets {
            self.deps.engine.validate_markets(&self.symbols)?;
            info!(symbols = self.symbols.len(), "strict markets validated");
        }
        for symbol in &self.symbols {
            self.deps.engine.cancel_all(symbol, "startup").await;
            self.deps.engine.flat_position(symbol).await;
        }
        info!("startup cancel-all + flatten complete");
        Ok(())
    }

    /// Shutdown hygiene: cancel-all + flatten every symbol. The one
    /// place shutdown is allowed to block briefly on exchange I/O.
    pub async fn shutdown(&self) {
        for symbol in &self.symbols {
            self.deps.engine.cancel_all(symbol, "shutdown").await;
            if !self.deps.engine.flat_position(symbol).await {
                error!(symbol = %symbol, "shutdown flatten incomplete");
            }
        }
        info!("shutdown cancel-all + flatten complete");
    }

    /// Run until the process receives a termination signal.
    pub async fn run(mut self, mut events: mpsc::Receiver<FeedEvent>) -> AppResult<()> {
        self.startup().await?;

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        let mut events_open = true;
        info!(
            symbols = self.symbols.len(),
            tick_secs = self.tick_interval.as_secs_f64(),
            "entering tick loop"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick_once().await;
                }
                maybe = events.recv(), if events_open => {
                    match maybe {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            warn!("feed channel closed; quoting will stop on staleness");
                            events_open = false;
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("termination signal received");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Apply one feed event to shared state and per-symbol strategy.
    pub async fn handle_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Market(market_event) => {
                self.deps.market.apply(&market_event);
                if let MarketEvent::Trade { symbol, price, qty } = market_event {
                    if let Some(slot) = self.slots.get(&symbol) {
                        let mid = self.deps.market.mid(&symbol);
                        slot.lock().await.strategy.on_trade(price, qty, mid);
                    }
                }
            }
            FeedEvent::Account(account_event) => match account_event {
                AccountEvent::Positions(snapshot) => {
                    self.deps.account.apply_snapshot(snapshot);
                }
                AccountEvent::Fill(fill) => {
                    self.deps.account.touch();
                    metrics::FILLS_TOTAL
                        .with_label_values(&[fill.symbol.as_str(), &fill.side.to_string()])
                        .inc();
                    if let Some(slot) = self.slots.get(&fill.symbol) {
                        let mut slot = slot.lock().await;
                        slot.strategy
                            .on_fill(fill.side, fill.qty, fill.price, fill.position_side);
                        // Partial fills keep resting; the adapter emits
                        // OrderGone when an order actually leaves the book.
                        // One side got hit: the opposite resting side
                        // becomes a hanging order instead of being
                        // refreshed away.
                        if slot.hanging_enabled {
                            for order in self
                                .deps
                                .engine
                                .opposite_side_orders(&fill.symbol, fill.side)
                            {
                                if let Some(order) =
                                    self.deps.engine.mark_hanging(&fill.symbol, &order.id)
                                {
                                    slot.strategy.add_hanging_order(order.id, order.price);
                                }
                            }
                        }
                    }
                }
                AccountEvent::OrderGone { symbol, order_id } => {
                    self.deps.account.touch();
                    self.deps.engine.on_order_gone(&symbol, &order_id);
                    if let Some(slot) = self.slots.get(&symbol) {
                        slot.lock().await.strategy.drop_hanging_order(&order_id);
                    }
                }
            },
        }
    }

    /// Run one tick over all symbols.
    pub async fn tick_once(&self) {
        // Pre-pass: exposure per symbol, plus the book total, so every
        // symbol task risk-checks against the same totals.
        let mut notionals: HashMap<Symbol, Decimal> = HashMap::with_capacity(self.symbols.len());
        let mut total = Decimal::ZERO;
        for symbol in &self.symbols {
            let book = self.deps.account.position(symbol);
            let inventory_notional = self
                .deps
                .market
                .mid(symbol)
                .map(|mid| (book.net() * mid.inner()).abs())
                .unwrap_or(Decimal::ZERO);
            let notional = inventory_notional + self.deps.engine.pending_notional(symbol);
            total += notional;
            notionals.insert(symbol.clone(), notional);
        }

        let dt = self.tick_interval.as_secs_f64() / DAY_SECS;
        let mut tasks = JoinSet::new();
        for symbol in &self.symbols {
            let slot = match self.slots.get(symbol) {
                Some(slot) => slot.clone(),
                None => continue,
            };
            let deps = self.deps.clone();
            let symbol = symbol.clone();
            let notional = notionals.get(&symbol).copied().unwrap_or(Decimal::ZERO);
            tasks.spawn(process_symbol(symbol, slot, deps, notional, total, dt));
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "symbol tick task failed");
            }
        }
    }

    /// Whether a symbol is currently quote-blocked on missing mids.
    pub async fn is_quote_blocked(&self, symbol: &Symbol) -> bool {
        match self.slots.get(symbol) {
            Some(slot) => slot.lock().await.quote_blocked,
            None => false,
        }
    }
}

/// One symbol's tick: feed checks, position sync, risk, requote.
async fn process_symbol(
    symbol: Symbol,
    slot: Arc<tokio::sync::Mutex<SymbolSlot>>,
    deps: Arc<TickDeps>,
    notional: Decimal,
    total_notional: Decimal,
    dt: f64,
) {
    let mut slot = slot.lock().await;
    let engine_cfg = &deps.cfg.engine;

    // 1. Mid price, with the consecutive-miss circuit breaker. No
    // fallback price source: no mid, no quotes.
    let mid = match deps.market.mid(&symbol) {
        Some(mid) => mid,
        None => {
            slot.mid_misses += 1;
            if slot.mid_misses >= engine_cfg.mid_none_limit && !slot.quote_blocked {
                slot.quote_blocked = true;
                metrics::QUOTE_BLOCKED
                    .with_label_values(&[symbol.as_str()])
                    .set(1.0);
                warn!(
                    symbol = %symbol,
                    misses = slot.mid_misses,
                    "mid missing, quoting blocked"
                );
            }
            return;
        }
    };
    slot.mid_misses = 0;
    if slot.quote_blocked {
        slot.quote_blocked = false;
        metrics::QUOTE_BLOCKED
            .with_label_values(&[symbol.as_str()])
            .set(0.0);
        info!(symbol = %symbol, "mid recovered, quoting unblocked");
    }

    // 2. Stale account stream: a safety pause, not an error.
    let account_fresh = deps
        .account
        .secs_since_update()
        .map(|age| age <= engine_cfg.account_stale_secs)
        .unwrap_or(false);
    if !account_fresh {
        metrics::ACCOUNT_STALE_SKIPS_TOTAL
            .with_label_values(&[symbol.as_str()])
            .inc();
        debug!(symbol = %symbol, "account stream stale, skipping tick");
        return;
    }

    // 3. Sync exchange truth into the strategy, advance its clock.
    let book = deps.account.position(&symbol);
    slot.strategy.set_exchange_position(book.long, book.short);
    slot.strategy.update_price(mid);
    slot.strategy.tick(dt);

    let action = deps
        .risk
        .lock()
        .check(&symbol, notional, total_notional);

    match action {
        RiskAction::Flat => {
            deps.engine.cancel_all(&symbol, "risk_flat").await;
            if deps.engine.flat_position(&symbol).await {
                // Local inventory resets only on a fully successful
                // flatten; otherwise it stays conservative.
                slot.strategy.reset_inventory();
            }
            return;
        }
        RiskAction::Pause | RiskAction::GlobalPause => {
            debug!(symbol = %symbol, action = %action, "risk pause, skipping quote");
            return;
        }
        RiskAction::Ok => {}
    }

    // 4. Hanging orders that drifted too far get cancelled explicitly.
    if slot.hanging_enabled {
        for order_id in slot.strategy.hanging_orders_to_cancel(mid) {
            if deps.engine.cancel_order(&symbol, &order_id).await {
                slot.strategy.drop_hanging_order(&order_id);
            }
        }
    }

    // 5. Refresh stale orders; without TTL/deviation configured,
    // cancel-all before requoting.
    let refresh_configured =
        engine_cfg.order_refresh_ttl_secs.is_some() || engine_cfg.order_deviation_bps.is_some();
    if refresh_configured {
        deps.engine
            .cancel_stale_orders(
                &symbol,
                mid,
                engine_cfg.order_refresh_ttl_secs,
                engine_cfg.order_deviation_bps,
                engine_cfg.min_cancel_interval_secs,
            )
            .await;
    } else {
        deps.engine.cancel_all(&symbol, "requote").await;
    }

    // 6. Quote.
    if !slot.strategy.is_ready() {
        debug!(symbol = %symbol, "strategy warming up");
        return;
    }
    let quotes = slot.strategy.get_quotes(mid);
    if quotes.iter().all(|quote| quote.is_empty()) {
        return;
    }
    for quote in &quotes {
        if quote.is_empty() {
            continue;
        }
        deps.engine.place_quote(&symbol, quote).await;
    }
}
