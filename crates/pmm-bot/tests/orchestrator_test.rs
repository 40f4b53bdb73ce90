//! End-to-end orchestrator tests against the paper exchange.

use parking_lot::Mutex;
use pmm_bot::{
    AppConfig, EngineSection, MarketMaker, PaperSection, RiskSection, SymbolConfig,
    TelemetrySection,
};
use pmm_core::{PositionBook, Price, Qty, Symbol};
use pmm_engine::{Engine, EngineSettings, ExchangeClient, ExchangeConfig, PaperExchange};
use pmm_feed::{AccountEvent, AccountState, FeedEvent, MarketEvent, MarketState};
use pmm_risk::RiskManager;
use pmm_strategy::AsConfig;
use pmm_telemetry::AlertSink;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;

fn sym() -> Symbol {
    Symbol::from("BTCUSDT")
}

fn app_config() -> AppConfig {
    let symbols = vec![SymbolConfig {
        symbol: "BTCUSDT".to_string(),
        strategy: AsConfig {
            gamma: 0.1,
            horizon: 0.05,
            max_inventory: 10.0,
            order_size: 1.0,
            vol_sampling_length: 5,
            vol_processing_length: 2,
            ..Default::default()
        },
    }];
    AppConfig {
        exchange: ExchangeConfig::default(),
        engine: EngineSection::default(),
        risk: RiskSection {
            per_symbol_limit: dec!(500),
            global_limit: dec!(5000),
            flat_threshold: dec!(900),
            cooldown_secs: 10,
            flat_retries: 2,
            flat_retry_backoff_secs: 0.0,
        },
        symbols,
        telemetry: TelemetrySection { alert_file: None },
        paper: PaperSection::default(),
    }
}

struct Harness {
    maker: MarketMaker,
    paper: Arc<PaperExchange>,
}

fn harness(cfg: AppConfig) -> Harness {
    let cfg = Arc::new(cfg);
    let paper = Arc::new(PaperExchange::new());
    let client: Arc<dyn ExchangeClient> = paper.clone();

    let market = Arc::new(MarketState::new());
    let account = Arc::new(AccountState::new());
    let engine = Arc::new(Engine::new(
        client,
        account.clone(),
        EngineSettings {
            hedge_mode: true,
            flat_retries: cfg.risk.flat_retries,
            flat_retry_backoff_secs: cfg.risk.flat_retry_backoff_secs,
        },
    ));
    let risk = Arc::new(Mutex::new(RiskManager::new(
        cfg.risk.limits(),
        Arc::new(AlertSink::disabled()),
    )));

    Harness {
        maker: MarketMaker::new(cfg, engine, market, account, risk),
        paper,
    }
}

fn mid_event(price: rust_decimal::Decimal) -> FeedEvent {
    FeedEvent::Market(MarketEvent::Mid {
        symbol: sym(),
        mid: Price::new(price),
    })
}

fn flat_positions() -> FeedEvent {
    FeedEvent::Account(AccountEvent::Positions(HashMap::new()))
}

fn long_position(qty: rust_decimal::Decimal) -> FeedEvent {
    let mut snapshot = HashMap::new();
    snapshot.insert(
        sym(),
        PositionBook {
            long: Qty::new(qty),
            short: Qty::ZERO,
            both: dec!(0),
        },
    );
    FeedEvent::Account(AccountEvent::Positions(snapshot))
}

#[tokio::test]
async fn test_quotes_reach_exchange_after_warmup() {
    let mut h = harness(app_config());

    h.maker.handle_event(flat_positions()).await;
    // Warm the volatility buffer: one mid sample per tick.
    for _ in 0..6 {
        h.maker.handle_event(mid_event(dec!(100))).await;
        h.maker.tick_once().await;
    }

    let open = h.paper.open_orders(&sym());
    assert_eq!(open.len(), 2, "expected a two-sided quote, got {open:?}");

    let bid = open.iter().find(|o| o.side == pmm_core::OrderSide::Buy).unwrap();
    let ask = open.iter().find(|o| o.side == pmm_core::OrderSide::Sell).unwrap();
    assert!(bid.price.inner() < dec!(100));
    assert!(ask.price.inner() > dec!(100));
}

#[tokio::test]
async fn test_no_quotes_while_warming_up() {
    let mut h = harness(app_config());

    h.maker.handle_event(flat_positions()).await;
    h.maker.handle_event(mid_event(dec!(100))).await;
    // Fewer ticks than the 5-sample volatility buffer needs.
    for _ in 0..3 {
        h.maker.tick_once().await;
    }
    assert!(h.paper.open_orders(&sym()).is_empty());
}

#[tokio::test]
async fn test_missing_mid_blocks_and_one_update_unblocks() {
    let mut h = harness(app_config()); // mid_none_limit = 3

    h.maker.handle_event(flat_positions()).await;
    for _ in 0..3 {
        h.maker.tick_once().await;
    }
    assert!(h.maker.is_quote_blocked(&sym()).await);

    // Exactly one mid update lifts the block on the next tick.
    h.maker.handle_event(mid_event(dec!(100))).await;
    h.maker.tick_once().await;
    assert!(!h.maker.is_quote_blocked(&sym()).await);
}

#[tokio::test]
async fn test_stale_account_stream_skips_quoting() {
    let mut h = harness(app_config());

    // Mid present but no account update has ever arrived.
    for _ in 0..6 {
        h.maker.handle_event(mid_event(dec!(100))).await;
        h.maker.tick_once().await;
    }
    assert!(h.paper.open_orders(&sym()).is_empty());
}

#[tokio::test]
async fn test_risk_flat_triggers_market_flatten() {
    let mut h = harness(app_config()); // flat_threshold = 900

    // 10 long at mid 100 = 1000 notional > 900.
    h.maker.handle_event(long_position(dec!(10))).await;
    h.maker.handle_event(mid_event(dec!(100))).await;
    h.maker.tick_once().await;

    assert_eq!(h.paper.market_order_count(), 1, "expected reduce-only flatten");
    assert!(h.paper.open_orders(&sym()).is_empty());

    // Cooldown: subsequent ticks pause, no new flatten orders.
    h.maker.handle_event(long_position(dec!(10))).await;
    h.maker.tick_once().await;
    assert_eq!(h.paper.market_order_count(), 1);
}

#[tokio::test]
async fn test_startup_flattens_existing_position() {
    let mut h = harness(app_config());
    h.maker.handle_event(long_position(dec!(2))).await;

    h.maker.startup().await.unwrap();
    assert_eq!(h.paper.market_order_count(), 1);
}

#[tokio::test]
async fn test_shutdown_cancels_and_flattens() {
    let mut h = harness(app_config());

    h.maker.handle_event(flat_positions()).await;
    for _ in 0..6 {
        h.maker.handle_event(mid_event(dec!(100))).await;
        h.maker.tick_once().await;
    }
    assert!(!h.paper.open_orders(&sym()).is_empty());

    h.maker.shutdown().await;
    assert!(h.paper.open_orders(&sym()).is_empty());
}
