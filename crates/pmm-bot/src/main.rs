//! Perpetual-futures market maker - entry point.

use anyhow::Result;
use clap::Parser;
use parking_lot::Mutex;
use pmm_bot::{load_market_specs, AppConfig, MarketMaker};
use pmm_engine::{build_client, Engine, EngineSettings};
use pmm_feed::{AccountState, FeedEvent, MarketState, PaperFeed};
use pmm_risk::RiskManager;
use pmm_telemetry::AlertSink;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Avellaneda-Stoikov market maker for perpetual futures.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (also settable via PMM_CONFIG).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    pmm_telemetry::init_logging()?;
    info!("starting pmm-bot v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .or_else(|| std::env::var("PMM_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());
    info!(config_path = %config_path, "loading configuration");

    let cfg = Arc::new(AppConfig::from_file(&config_path)?);
    info!(
        exchange = %cfg.exchange.name,
        symbols = cfg.symbols.len(),
        "configuration loaded"
    );

    let alerts = Arc::new(match &cfg.telemetry.alert_file {
        Some(path) => AlertSink::open(path),
        None => AlertSink::disabled(),
    });

    let market = Arc::new(MarketState::new());
    let account = Arc::new(AccountState::new());

    let client = build_client(&cfg.exchange)?;
    let mut engine = Engine::new(
        client,
        account.clone(),
        EngineSettings {
            hedge_mode: cfg.engine.hedge_mode,
            flat_retries: cfg.risk.flat_retries,
            flat_retry_backoff_secs: cfg.risk.flat_retry_backoff_secs,
        },
    );
    if let Some(markets_file) = &cfg.engine.markets_file {
        let specs = load_market_specs(Path::new(markets_file))?;
        info!(markets = specs.len(), file = %markets_file, "market specs loaded");
        engine.set_market_specs(specs);
    }
    let engine = Arc::new(engine);

    let risk = Arc::new(Mutex::new(RiskManager::new(cfg.risk.limits(), alerts)));

    // Stream adapters push into one bounded channel; the tick loop
    // reads shared state only. The paper feed stands in for the real
    // market-data and account streams when running without an
    // exchange connection.
    let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(1024);
    if cfg.exchange.name == "paper" {
        let start_prices = cfg
            .symbol_list()
            .into_iter()
            .map(|symbol| {
                // The config layer lowercases table keys; match
                // case-insensitively.
                let price = cfg
                    .paper
                    .start_prices
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(symbol.as_str()))
                    .map(|(_, price)| *price)
                    .unwrap_or(100.0);
                (symbol, price)
            })
            .collect();
        let feed = PaperFeed::new(
            start_prices,
            Duration::from_millis(cfg.paper.feed_interval_ms),
            4,
        );
        tokio::spawn(feed.run(feed_tx));
    } else {
        // Real stream adapters connect here and own feed_tx.
        drop(feed_tx);
    }

    let maker = MarketMaker::new(cfg, engine, market, account, risk);
    maker.run(feed_rx).await?;

    info!("pmm-bot stopped");
    Ok(())
}
