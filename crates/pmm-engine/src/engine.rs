//! Order lifecycle engine.
//!
//! Tracks locally known open orders per symbol, places two-sided
//! quotes, refreshes stale orders, and force-flattens positions
//! against the authoritative account snapshot. All exchange I/O is
//! async; per-symbol state is lock-guarded so symbol ticks may run
//! concurrently.

use crate::error::{EngineError, EngineResult};
use crate::exchange::{ExchangeClient, OrderParams};
use chrono::Utc;
use parking_lot::Mutex;
use pmm_core::{MarketSpec, Order, OrderSide, PositionSide, Price, Qty, Quote, Symbol};
use pmm_feed::AccountState;
use pmm_telemetry::metrics;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Engine behaviour knobs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Submit quotes with explicit LONG/SHORT position sides.
    pub hedge_mode: bool,
    /// Flatten attempts per position side.
    pub flat_retries: u32,
    /// Base backoff between flatten attempts; attempt `n` waits
    /// `n * flat_retry_backoff_secs`.
    pub flat_retry_backoff_secs: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            hedge_mode: true,
            flat_retries: 3,
            flat_retry_backoff_secs: 1.0,
        }
    }
}

/// Order engine over one exchange client.
pub struct Engine {
    client: Arc<dyn ExchangeClient>,
    account: Arc<AccountState>,
    settings: EngineSettings,
    specs: HashMap<Symbol, MarketSpec>,
    /// Open orders from normal quoting, cancelled on refresh.
    orders: Mutex<HashMap<Symbol, Vec<Order>>>,
    /// Orders intentionally kept past refresh, cancelled on drift only.
    hanging: Mutex<HashMap<Symbol, Vec<Order>>>,
    /// Last cancel time per symbol, for the cancel-storm guard.
    last_cancel: Mutex<HashMap<Symbol, Instant>>,
    flat_failures: AtomicU64,
    rate_limit_hits: AtomicU64,
}

impl Engine {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        account: Arc<AccountState>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            client,
            account,
            settings,
            specs: HashMap::new(),
            orders: Mutex::new(HashMap::new()),
            hanging: Mutex::new(HashMap::new()),
            last_cancel: Mutex::new(HashMap::new()),
            flat_failures: AtomicU64::new(0),
            rate_limit_hits: AtomicU64::new(0),
        }
    }

    /// Load market metadata for strict-mode validation and rounding.
    pub fn set_market_specs(&mut self, specs: HashMap<Symbol, MarketSpec>) {
        self.specs = specs;
    }

    pub fn spec_for(&self, symbol: &Symbol) -> Option<&MarketSpec> {
        self.specs.get(symbol)
    }

    /// Strict markets mode: refuse to trade on incomplete metadata.
    ///
    /// Called once at startup, before any order is placed.
    pub fn validate_markets(&self, symbols: &[Symbol]) -> EngineResult<()> {
        for symbol in symbols {
            let spec = self
                .specs
                .get(symbol)
                .ok_or_else(|| EngineError::MissingMarket(symbol.to_string()))?;
            spec.validate(symbol)
                .map_err(|e| EngineError::InvalidMarket {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Submit up to two limit legs for a quote.
    ///
    /// A failed leg is logged and counted; the other leg still goes
    /// out. Returns the orders that were acknowledged.
    pub async fn place_quote(&self, symbol: &Symbol, quote: &Quote) -> Vec<Order> {
        let mut placed = Vec::with_capacity(2);

        let legs = [
            (OrderSide::Buy, quote.bid_qty, quote.bid_price),
            (OrderSide::Sell, quote.ask_qty, quote.ask_price),
        ];

        for (side, qty, price) in legs {
            if !qty.is_positive() || !price.is_positive() {
                continue;
            }
            let position_side = self.entry_position_side(side);
            let params = OrderParams::maker(position_side);
            let client_id = params.client_id.clone().unwrap_or_default();

            match self
                .client
                .create_limit_order(symbol, side, qty, price, params)
                .await
            {
                Ok(id) => {
                    let order = Order {
                        id,
                        client_id,
                        symbol: symbol.clone(),
                        side,
                        position_side,
                        price,
                        qty,
                        placed_at: Utc::now(),
                    };
                    metrics::ORDERS_PLACED_TOTAL
                        .with_label_values(&[symbol.as_str(), &side.to_string()])
                        .inc();
                    debug!(symbol = %symbol, %side, %qty, %price, id = %order.id, "quote leg placed");
                    self.orders
                        .lock()
                        .entry(symbol.clone())
                        .or_default()
                        .push(order.clone());
                    placed.push(order);
                }
                Err(e) => {
                    self.note_rate_limit(&e);
                    metrics::ORDER_LEG_FAILED_TOTAL
                        .with_label_values(&[symbol.as_str(), &side.to_string()])
                        .inc();
                    warn!(symbol = %symbol, %side, %qty, %price, error = %e, "quote leg failed");
                }
            }
        }

        placed
    }

    fn entry_position_side(&self, side: OrderSide) -> PositionSide {
        if self.settings.hedge_mode {
            match side {
                OrderSide::Buy => PositionSide::Long,
                OrderSide::Sell => PositionSide::Short,
            }
        } else {
            PositionSide::Both
        }
    }

    /// Cancel every open order for the symbol.
    ///
    /// "No open orders" is benign; rate-limit-shaped failures are
    /// counted separately for observability.
    pub async fn cancel_all(&self, symbol: &Symbol, trigger: &str) -> bool {
        let result = self.client.cancel_all_orders(symbol).await;
        let ok = match result {
            Ok(()) => true,
            Err(e) if e.is_no_open_orders() => true,
            Err(e) => {
                self.note_rate_limit(&e);
                warn!(symbol = %symbol, trigger, error = %e, "cancel-all failed");
                false
            }
        };
        if ok {
            self.orders.lock().remove(symbol);
            // Exchange-side cancel-all removes hanging orders too.
            self.hanging.lock().remove(symbol);
            self.last_cancel.lock().insert(symbol.clone(), Instant::now());
            metrics::CANCELS_TOTAL
                .with_label_values(&[symbol.as_str(), trigger])
                .inc();
        }
        ok
    }

    /// Cancel tracked orders that aged past `ttl_secs` or drifted past
    /// `deviation_bps` from `mid`, rate-limited to one sweep per
    /// `min_interval_secs`.
    ///
    /// Returns true when at least one order was cancelled.
    pub async fn cancel_stale_orders(
        &self,
        symbol: &Symbol,
        mid: Price,
        ttl_secs: Option<f64>,
        deviation_bps: Option<Decimal>,
        min_interval_secs: f64,
    ) -> bool {
        if ttl_secs.is_none() && deviation_bps.is_none() {
            return false;
        }

        if let Some(last) = self.last_cancel.lock().get(symbol) {
            if last.elapsed().as_secs_f64() < min_interval_secs {
                return false;
            }
        }

        let now = Utc::now();
        let stale: Vec<Order> = {
            let orders = self.orders.lock();
            orders
                .get(symbol)
                .map(|list| {
                    list.iter()
                        .filter(|o| {
                            let aged =
                                ttl_secs.map(|ttl| o.age_secs(now) > ttl).unwrap_or(false);
                            let drifted = deviation_bps
                                .and_then(|max| o.deviation_bps(mid).map(|d| d > max))
                                .unwrap_or(false);
                            aged || drifted
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        if stale.is_empty() {
            return false;
        }

        let mut cancelled = false;
        for order in &stale {
            match self.client.cancel_order(symbol, &order.id).await {
                Ok(()) => cancelled = true,
                Err(e) if e.is_no_open_orders() => cancelled = true,
                Err(e) => {
                    self.note_rate_limit(&e);
                    warn!(symbol = %symbol, id = %order.id, error = %e, "stale cancel failed");
                    continue;
                }
            }
            if let Some(list) = self.orders.lock().get_mut(symbol) {
                list.retain(|o| o.id != order.id);
            }
        }

        if cancelled {
            self.last_cancel.lock().insert(symbol.clone(), Instant::now());
            metrics::CANCELS_TOTAL
                .with_label_values(&[symbol.as_str(), "stale"])
                .inc();
            debug!(symbol = %symbol, count = stale.len(), "stale orders cancelled");
        }
        cancelled
    }

    /// Cancel a single order by exchange id (hanging-order drift).
    pub async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> bool {
        let ok = match self.client.cancel_order(symbol, order_id).await {
            Ok(()) => true,
            Err(e) if e.is_no_open_orders() => true,
            Err(e) => {
                self.note_rate_limit(&e);
                warn!(symbol = %symbol, id = %order_id, error = %e, "cancel failed");
                false
            }
        };
        if ok {
            self.forget_order(symbol, order_id);
        }
        ok
    }

    /// Move a tracked order into the hanging set so refresh sweeps
    /// leave it resting. Returns the order when found.
    pub fn mark_hanging(&self, symbol: &Symbol, order_id: &str) -> Option<Order> {
        let mut orders = self.orders.lock();
        let list = orders.get_mut(symbol)?;
        let idx = list.iter().position(|o| o.id == order_id)?;
        let order = list.remove(idx);
        drop(orders);

        self.hanging
            .lock()
            .entry(symbol.clone())
            .or_default()
            .push(order.clone());
        Some(order)
    }

    /// Tracked orders on the opposite side of `side` (hanging-order
    /// promotion after a fill).
    pub fn opposite_side_orders(&self, symbol: &Symbol, side: OrderSide) -> Vec<Order> {
        self.orders
            .lock()
            .get(symbol)
            .map(|list| {
                list.iter()
                    .filter(|o| o.side == side.opposite())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop a tracked order on fill/cancel acknowledgment from the
    /// account stream.
    pub fn on_order_gone(&self, symbol: &Symbol, order_id: &str) {
        self.forget_order(symbol, order_id);
    }

    fn forget_order(&self, symbol: &Symbol, order_id: &str) {
        if let Some(list) = self.orders.lock().get_mut(symbol) {
            list.retain(|o| o.id != order_id);
        }
        if let Some(list) = self.hanging.lock().get_mut(symbol) {
            list.retain(|o| o.id != order_id);
        }
    }

    /// Sum of |price*qty| across tracked open orders (hanging
    /// included): unfilled exposure the risk check must see.
    pub fn pending_notional(&self, symbol: &Symbol) -> Decimal {
        let tracked: Decimal = self
            .orders
            .lock()
            .get(symbol)
            .map(|list| list.iter().map(|o| o.notional()).sum())
            .unwrap_or(Decimal::ZERO);
        let hanging: Decimal = self
            .hanging
            .lock()
            .get(symbol)
            .map(|list| list.iter().map(|o| o.notional()).sum())
            .unwrap_or(Decimal::ZERO);
        tracked + hanging
    }

    /// Currently tracked (non-hanging) orders for a symbol.
    pub fn tracked_orders(&self, symbol: &Symbol) -> Vec<Order> {
        self.orders
            .lock()
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    /// Force-close the symbol's position with reduce-only market
    /// orders, one per non-flat position side.
    ///
    /// Already-flat symbols succeed without touching the exchange.
    /// Each side is retried `flat_retries` times with linearly growing
    /// backoff; overall success requires every side to submit. On
    /// failure local inventory is left untouched so monitoring (and a
    /// human) can intervene.
    pub async fn flat_position(&self, symbol: &Symbol) -> bool {
        let book = self.account.position(symbol);
        if book.is_flat() {
            debug!(symbol = %symbol, "already flat");
            return true;
        }

        let mut legs: Vec<(OrderSide, Qty, PositionSide)> = Vec::with_capacity(3);
        if book.long.is_positive() {
            legs.push((OrderSide::Sell, book.long, PositionSide::Long));
        }
        if book.short.is_positive() {
            legs.push((OrderSide::Buy, book.short, PositionSide::Short));
        }
        if !book.both.is_zero() {
            let side = if book.both.is_sign_positive() {
                OrderSide::Sell
            } else {
                OrderSide::Buy
            };
            legs.push((side, Qty::new(book.both.abs()), PositionSide::Both));
        }

        let attempts = self.settings.flat_retries.max(1);
        let mut all_ok = true;

        for (side, qty, position_side) in legs {
            let mut leg_ok = false;
            for attempt in 1..=attempts {
                let params = OrderParams::reduce_only(position_side);
                match self
                    .client
                    .create_market_order(symbol, side, qty, params)
                    .await
                {
                    Ok(id) => {
                        info!(
                            symbol = %symbol,
                            %side,
                            %qty,
                            position_side = %position_side,
                            id = %id,
                            attempt,
                            "flatten order submitted"
                        );
                        leg_ok = true;
                        break;
                    }
                    Err(e) => {
                        self.note_rate_limit(&e);
                        warn!(
                            symbol = %symbol,
                            %side,
                            attempt,
                            error = %e,
                            "flatten order failed"
                        );
                        if attempt < attempts {
                            let backoff = self.settings.flat_retry_backoff_secs * attempt as f64;
                            tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                        }
                    }
                }
            }
            if !leg_ok {
                all_ok = false;
            }
        }

        if !all_ok {
            self.flat_failures.fetch_add(1, Ordering::Relaxed);
            metrics::FLAT_FAILURE_TOTAL
                .with_label_values(&[symbol.as_str()])
                .inc();
            error!(symbol = %symbol, "flatten incomplete after retries");
        }
        all_ok
    }

    /// Cumulative flatten failures since startup.
    pub fn flat_failure_count(&self) -> u64 {
        self.flat_failures.load(Ordering::Relaxed)
    }

    /// Cumulative rate-limit-shaped errors since startup.
    pub fn rate_limit_count(&self) -> u64 {
        self.rate_limit_hits.load(Ordering::Relaxed)
    }

    fn note_rate_limit(&self, e: &crate::exchange::ExchangeError) {
        if e.is_rate_limited() {
            self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
            metrics::RATE_LIMITED_TOTAL.inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{ExchangeError, MockExchangeClient};
    use pmm_core::PositionBook;
    use rust_decimal_macros::dec;
    use std::collections::HashMap as StdHashMap;

    fn sym() -> Symbol {
        Symbol::from("BTCUSDT")
    }

    fn quote() -> Quote {
        Quote {
            bid_price: Price::new(dec!(99)),
            bid_qty: Qty::new(dec!(1)),
            ask_price: Price::new(dec!(101)),
            ask_qty: Qty::new(dec!(1)),
        }
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            hedge_mode: true,
            flat_retries: 3,
            flat_retry_backoff_secs: 0.0,
        }
    }

    fn engine_with(mock: MockExchangeClient) -> Engine {
        Engine::new(Arc::new(mock), Arc::new(AccountState::new()), settings())
    }

    fn account_with(book: PositionBook) -> Arc<AccountState> {
        let account = Arc::new(AccountState::new());
        let mut snap = StdHashMap::new();
        snap.insert(sym(), book);
        account.apply_snapshot(snap);
        account
    }

    #[tokio::test]
    async fn test_place_quote_both_legs() {
        let mut mock = MockExchangeClient::new();
        let mut n = 0u32;
        mock.expect_create_limit_order()
            .times(2)
            .returning(move |_, _, _, _, _| {
                n += 1;
                Ok(format!("o{n}"))
            });

        let engine = engine_with(mock);
        let placed = engine.place_quote(&sym(), &quote()).await;
        assert_eq!(placed.len(), 2);
        assert_eq!(engine.tracked_orders(&sym()).len(), 2);

        // pending = 99*1 + 101*1
        assert_eq!(engine.pending_notional(&sym()), dec!(200));
    }

    #[tokio::test]
    async fn test_place_quote_one_leg_fails() {
        let mut mock = MockExchangeClient::new();
        mock.expect_create_limit_order()
            .times(2)
            .returning(|_, side, _, _, _| match side {
                OrderSide::Buy => Err(ExchangeError::Other("rejected".to_string())),
                OrderSide::Sell => Ok("s1".to_string()),
            });

        let engine = engine_with(mock);
        let placed = engine.place_quote(&sym(), &quote()).await;
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].side, OrderSide::Sell);
        assert_eq!(engine.tracked_orders(&sym()).len(), 1);
    }

    #[tokio::test]
    async fn test_place_quote_skips_zero_sides() {
        let mock = MockExchangeClient::new(); // no calls expected
        let engine = engine_with(mock);
        let q = Quote {
            bid_price: Price::new(dec!(99)),
            bid_qty: Qty::ZERO,
            ask_price: Price::new(dec!(101)),
            ask_qty: Qty::ZERO,
        };
        let placed = engine.place_quote(&sym(), &q).await;
        assert!(placed.is_empty());
    }

    #[tokio::test]
    async fn test_hedge_mode_position_sides() {
        let mut mock = MockExchangeClient::new();
        mock.expect_create_limit_order()
            .times(2)
            .returning(|_, side, _, _, params| {
                match side {
                    OrderSide::Buy => assert_eq!(params.position_side, PositionSide::Long),
                    OrderSide::Sell => assert_eq!(params.position_side, PositionSide::Short),
                }
                Ok("x".to_string())
            });
        let engine = engine_with(mock);
        engine.place_quote(&sym(), &quote()).await;
    }

    #[tokio::test]
    async fn test_cancel_all_no_open_orders_is_benign() {
        let mut mock = MockExchangeClient::new();
        mock.expect_cancel_all_orders()
            .times(1)
            .returning(|_| Err(ExchangeError::NoOpenOrders));

        let engine = engine_with(mock);
        assert!(engine.cancel_all(&sym(), "refresh").await);
    }

    #[tokio::test]
    async fn test_cancel_all_rate_limited_counted() {
        let mut mock = MockExchangeClient::new();
        mock.expect_cancel_all_orders()
            .times(1)
            .returning(|_| Err(ExchangeError::RateLimited("429".to_string())));

        let engine = engine_with(mock);
        assert!(!engine.cancel_all(&sym(), "refresh").await);
        assert_eq!(engine.rate_limit_count(), 1);
    }

    fn seed_order(engine: &Engine, id: &str, price: Price, age_secs: i64) {
        let order = Order {
            id: id.to_string(),
            client_id: pmm_core::ClientOrderId::new(),
            symbol: sym(),
            side: OrderSide::Buy,
            position_side: PositionSide::Long,
            price,
            qty: Qty::new(dec!(1)),
            placed_at: Utc::now() - chrono::Duration::seconds(age_secs),
        };
        engine.orders.lock().entry(sym()).or_default().push(order);
    }

    #[tokio::test]
    async fn test_cancel_stale_by_ttl() {
        let mut mock = MockExchangeClient::new();
        mock.expect_cancel_order()
            .times(1)
            .returning(|_, _| Ok(()));

        let engine = engine_with(mock);
        seed_order(&engine, "old", Price::new(dec!(100)), 120);
        seed_order(&engine, "new", Price::new(dec!(100)), 1);

        let cancelled = engine
            .cancel_stale_orders(&sym(), Price::new(dec!(100)), Some(60.0), None, 0.0)
            .await;
        assert!(cancelled);

        let remaining = engine.tracked_orders(&sym());
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "new");
    }

    #[tokio::test]
    async fn test_cancel_stale_by_deviation() {
        let mut mock = MockExchangeClient::new();
        mock.expect_cancel_order()
            .times(1)
            .returning(|_, _| Ok(()));

        let engine = engine_with(mock);
        // 5% away from mid = 500 bps
        seed_order(&engine, "far", Price::new(dec!(95)), 1);
        seed_order(&engine, "near", Price::new(dec!(99.9)), 1);

        let cancelled = engine
            .cancel_stale_orders(&sym(), Price::new(dec!(100)), None, Some(dec!(100)), 0.0)
            .await;
        assert!(cancelled);
        assert_eq!(engine.tracked_orders(&sym())[0].id, "near");
    }

    #[tokio::test]
    async fn test_cancel_stale_respects_min_interval() {
        let mut mock = MockExchangeClient::new();
        mock.expect_cancel_order()
            .times(1)
            .returning(|_, _| Ok(()));

        let engine = engine_with(mock);
        seed_order(&engine, "old1", Price::new(dec!(100)), 120);

        assert!(
            engine
                .cancel_stale_orders(&sym(), Price::new(dec!(100)), Some(60.0), None, 300.0)
                .await
        );

        // Second sweep inside the interval is suppressed even though
        // another stale order exists.
        seed_order(&engine, "old2", Price::new(dec!(100)), 120);
        assert!(
            !engine
                .cancel_stale_orders(&sym(), Price::new(dec!(100)), Some(60.0), None, 300.0)
                .await
        );
    }

    #[tokio::test]
    async fn test_cancel_stale_unconfigured_is_noop() {
        let mock = MockExchangeClient::new();
        let engine = engine_with(mock);
        seed_order(&engine, "old", Price::new(dec!(100)), 120);
        assert!(
            !engine
                .cancel_stale_orders(&sym(), Price::new(dec!(100)), None, None, 0.0)
                .await
        );
    }

    #[tokio::test]
    async fn test_flat_position_already_flat() {
        let mock = MockExchangeClient::new(); // no calls expected
        let engine = engine_with(mock);
        assert!(engine.flat_position(&sym()).await);
        assert_eq!(engine.flat_failure_count(), 0);
    }

    #[tokio::test]
    async fn test_flat_position_hedge_legs() {
        let mut mock = MockExchangeClient::new();
        mock.expect_create_market_order()
            .times(2)
            .returning(|_, side, qty, params| {
                match params.position_side {
                    PositionSide::Long => {
                        assert_eq!(side, OrderSide::Sell);
                        assert_eq!(qty, Qty::new(dec!(1)));
                    }
                    PositionSide::Short => {
                        assert_eq!(side, OrderSide::Buy);
                        assert_eq!(qty, Qty::new(dec!(2)));
                    }
                    PositionSide::Both => panic!("unexpected one-way leg"),
                }
                Ok("f".to_string())
            });

        let account = account_with(PositionBook {
            long: Qty::new(dec!(1)),
            short: Qty::new(dec!(2)),
            both: dec!(0),
        });
        let engine = Engine::new(Arc::new(mock), account, settings());
        assert!(engine.flat_position(&sym()).await);
    }

    #[tokio::test]
    async fn test_flat_position_one_way_short() {
        let mut mock = MockExchangeClient::new();
        mock.expect_create_market_order()
            .times(1)
            .returning(|_, side, qty, params| {
                assert_eq!(side, OrderSide::Buy);
                assert_eq!(qty, Qty::new(dec!(3)));
                assert_eq!(params.position_side, PositionSide::Both);
                assert!(params.reduce_only);
                Ok("f".to_string())
            });

        let account = account_with(PositionBook {
            long: Qty::ZERO,
            short: Qty::ZERO,
            both: dec!(-3),
        });
        let engine = Engine::new(Arc::new(mock), account, settings());
        assert!(engine.flat_position(&sym()).await);
    }

    #[tokio::test]
    async fn test_flat_position_retries_then_succeeds() {
        let mut mock = MockExchangeClient::new();
        let mut calls = 0u32;
        mock.expect_create_market_order()
            .times(2)
            .returning(move |_, _, _, _| {
                calls += 1;
                if calls == 1 {
                    Err(ExchangeError::Other("timeout".to_string()))
                } else {
                    Ok("f".to_string())
                }
            });

        let account = account_with(PositionBook {
            long: Qty::new(dec!(1)),
            short: Qty::ZERO,
            both: dec!(0),
        });
        let engine = Engine::new(Arc::new(mock), account, settings());
        assert!(engine.flat_position(&sym()).await);
        assert_eq!(engine.flat_failure_count(), 0);
    }

    #[tokio::test]
    async fn test_flat_position_gives_up_and_counts() {
        let mut mock = MockExchangeClient::new();
        mock.expect_create_market_order()
            .times(3) // flat_retries
            .returning(|_, _, _, _| Err(ExchangeError::Other("down".to_string())));

        let account = account_with(PositionBook {
            long: Qty::new(dec!(1)),
            short: Qty::ZERO,
            both: dec!(0),
        });
        let engine = Engine::new(Arc::new(mock), account, settings());
        assert!(!engine.flat_position(&sym()).await);
        assert_eq!(engine.flat_failure_count(), 1);
    }

    #[tokio::test]
    async fn test_mark_hanging_excluded_from_refresh() {
        let mut mock = MockExchangeClient::new();
        mock.expect_cancel_order().never();

        let engine = engine_with(mock);
        seed_order(&engine, "h1", Price::new(dec!(100)), 120);
        let order = engine.mark_hanging(&sym(), "h1").unwrap();
        assert_eq!(order.id, "h1");

        // Stale sweep sees no tracked orders.
        assert!(
            !engine
                .cancel_stale_orders(&sym(), Price::new(dec!(100)), Some(60.0), None, 0.0)
                .await
        );
        // But the hanging order still counts toward pending exposure.
        assert_eq!(engine.pending_notional(&sym()), dec!(100));
    }

    #[tokio::test]
    async fn test_on_order_gone_forgets() {
        let mock = MockExchangeClient::new();
        let engine = engine_with(mock);
        seed_order(&engine, "o1", Price::new(dec!(100)), 1);
        engine.on_order_gone(&sym(), "o1");
        assert!(engine.tracked_orders(&sym()).is_empty());
        assert_eq!(engine.pending_notional(&sym()), dec!(0));
    }

    #[tokio::test]
    async fn test_opposite_side_orders() {
        let mock = MockExchangeClient::new();
        let engine = engine_with(mock);
        seed_order(&engine, "b1", Price::new(dec!(99)), 1); // Buy
        let opposite = engine.opposite_side_orders(&sym(), OrderSide::Sell);
        assert_eq!(opposite.len(), 1);
        assert_eq!(opposite[0].id, "b1");
        assert!(engine.opposite_side_orders(&sym(), OrderSide::Buy).is_empty());
    }

    #[test]
    fn test_validate_markets_strict() {
        let mock = MockExchangeClient::new();
        let mut engine = engine_with(mock);

        // Missing spec is fatal.
        assert!(matches!(
            engine.validate_markets(&[sym()]),
            Err(EngineError::MissingMarket(_))
        ));

        // Complete spec passes.
        let mut specs = StdHashMap::new();
        specs.insert(
            sym(),
            MarketSpec {
                price_decimals: 2,
                qty_decimals: 3,
                min_qty: Qty::new(dec!(0.001)),
                min_notional: dec!(5),
            },
        );
        engine.set_market_specs(specs);
        assert!(engine.validate_markets(&[sym()]).is_ok());

        // Incomplete spec is fatal.
        let mut bad = StdHashMap::new();
        bad.insert(
            sym(),
            MarketSpec {
                price_decimals: 2,
                qty_decimals: 3,
                min_qty: Qty::ZERO,
                min_notional: dec!(5),
            },
        );
        engine.set_market_specs(bad);
        assert!(matches!(
            engine.validate_markets(&[sym()]),
            Err(EngineError::InvalidMarket { .. })
        ));
    }
}
