//! # kbot-runner
//!
//! Main entry point for the Kraken SMA crossover bot.
//!
//! Loads the JSON configuration (optional) and API credentials from the
//! environment, then wires the pipeline:
//!
//! ```text
//! FeedSession ──► TradeLedger
//!      │
//!      └─ bounded channel ──► StrategyEngine ──► OrderDispatcher ──► OrderGateway
//! ```
//!
//! and runs until Ctrl+C, or until the feed exhausts its reconnect budget.
//!
//! # Usage
//!
//! ```bash
//! KRAKEN_API_KEY=... KRAKEN_API_SECRET=... kbot-runner config.json --log-level info
//! kbot-runner --dry-run --log-dir ./logs
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use kbot_core::config::{AppConfig, load_config};
use kbot_core::ledger::TradeLedger;
use kbot_core::ws::TungsteniteConnector;
use kbot_md::{FeedSession, FeedSessionConfig};
use kbot_strategy::StrategyEngine;
use kbot_strategy::backtest;
use kbot_strategy::task::spawn_strategy;
use kbot_td::dry_run::DryRunGateway;
use kbot_td::kraken::{KrakenGateway, KrakenTdConfig, rest_pair_name};
use kbot_td::retry::RetryingGateway;
use kbot_td::{OrderDispatcher, OrderEvent, OrderEventReceiver, OrderGateway};
use tracing::{info, warn};

/// Kraken SMA crossover trading bot.
#[derive(Parser)]
#[command(name = "kbot-runner", about = "Kraken SMA crossover trading bot")]
struct Cli {
    /// Configuration file path (JSON). Defaults are used when omitted.
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Directory for daily-rotating log files. Overrides the config file.
    #[arg(long)]
    log_dir: Option<String>,

    /// Log orders instead of sending them to Kraken.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Environment and configuration
    let dotenv = dotenvy::dotenv();
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Ok(pair) = std::env::var("PAIR") {
        config.feed.pair = pair;
    }
    if cli.dry_run {
        config.trading.dry_run = true;
    }
    config.validate().context("invalid configuration")?;

    // 2. Logging
    let log_level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_dir = cli.log_dir.as_deref().or(config.logging.dir.as_deref());
    let _log_guard = kbot_core::logging::init_logging(log_level, log_dir, &config.logging.file_prefix);

    info!("kbot-runner starting, log_level={log_level}");
    if let Ok(path) = dotenv {
        info!("environment loaded from {}", path.display());
    }
    info!("PAIR variable set to: {}", config.feed.pair);

    // 3. Order path
    let gateway = build_gateway(&config)?;
    let (dispatcher, order_events) = OrderDispatcher::spawn(gateway, config.trading.queue_capacity);
    let event_log = tokio::spawn(log_order_events(order_events));

    // 4. Strategy
    let (tick_tx, tick_rx) = tokio::sync::mpsc::channel(config.feed.tick_channel_capacity);
    let submitter = dispatcher.submitter();
    let strategy = spawn_strategy(
        StrategyEngine::new(config.strategy.clone()),
        tick_rx,
        Duration::from_secs(config.strategy.report_interval_secs.max(1)),
        move |intent| {
            submitter.submit(intent);
        },
    );

    // 5. Feed
    let ledger = Arc::new(match config.feed.ledger_retention {
        Some(max) => TradeLedger::with_retention(max),
        None => TradeLedger::new(),
    });
    let mut feed = FeedSession::new(
        FeedSessionConfig::from(&config.feed),
        TungsteniteConnector::new(),
        Arc::clone(&ledger),
        tick_tx,
    )
    .start();

    info!("feed started, press Ctrl+C to stop");

    // 6. Wait for Ctrl+C, or for the feed to give up reconnecting
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("shutdown signal received");
        }
        _ = feed.stopped() => warn!("feed session ended, shutting down"),
    }

    // 7. Stop in dependency order: feed, strategy, orders
    feed.shutdown().await;
    let engine = strategy.await.context("strategy task failed")?;
    dispatcher.shutdown().await;
    if let Err(e) = event_log.await {
        warn!("order event logger failed: {e}");
    }

    info!("final position: {:?}", engine.position());
    info!("final report: {}", engine.report());
    let replay = backtest::replay(&ledger.snapshot(), &config.strategy);
    info!(
        "ledger replay over {} ticks ({} appended in total): {}",
        replay.report.evaluated_ticks,
        ledger.total_appended(),
        replay.report
    );

    info!("all components stopped, goodbye");
    Ok(())
}

fn build_gateway(config: &AppConfig) -> Result<Arc<dyn OrderGateway>> {
    if config.trading.dry_run {
        info!("dry run: orders are logged, not sent");
        return Ok(Arc::new(DryRunGateway::new(rest_pair_name(&config.feed.pair))));
    }

    let api_key = std::env::var("KRAKEN_API_KEY").context("KRAKEN_API_KEY is not set (use --dry-run to trade on paper)")?;
    let api_secret = std::env::var("KRAKEN_API_SECRET").context("KRAKEN_API_SECRET is not set")?;
    let td_config = KrakenTdConfig::new(api_key, api_secret, &config.feed.pair, &config.trading);
    info!("order gateway: {td_config:?}");

    let kraken = KrakenGateway::new(td_config)?;
    Ok(Arc::new(RetryingGateway::from_config(kraken, &config.trading)))
}

/// Tally order outcomes until the dispatcher shuts down. Each outcome is
/// already logged by the dispatcher.
async fn log_order_events(mut events: OrderEventReceiver) {
    let (mut placed, mut failed, mut dropped) = (0u64, 0u64, 0u64);
    while let Some(event) = events.recv().await {
        match event {
            OrderEvent::Placed { ack, .. } => {
                placed += 1;
                info!("[orders] txids={:?} descr={}", ack.txids, ack.description.as_deref().unwrap_or("-"));
            }
            OrderEvent::Failed { .. } => failed += 1,
            OrderEvent::Dropped { .. } => dropped += 1,
        }
    }
    info!("[orders] placed={placed} failed={failed} dropped={dropped}");
}
