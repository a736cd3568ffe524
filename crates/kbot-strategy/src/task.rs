//! Async driver for [`StrategyEngine`].
//!
//! The task is the only owner of the engine, so position state needs no
//! locking. It exits once the tick channel closes (the feed session dropped
//! its sender) and hands the engine back for the final report.

use std::time::Duration;

use kbot_core::types::{OrderIntent, Tick};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::engine::StrategyEngine;

/// Spawn the strategy loop. `submit` receives every intent and must not block.
pub fn spawn_strategy<F>(
    engine: StrategyEngine,
    ticks: mpsc::Receiver<Tick>,
    report_interval: Duration,
    submit: F,
) -> JoinHandle<StrategyEngine>
where
    F: FnMut(OrderIntent) + Send + 'static,
{
    tokio::spawn(run_strategy(engine, ticks, report_interval, submit))
}

pub async fn run_strategy<F>(
    mut engine: StrategyEngine,
    mut ticks: mpsc::Receiver<Tick>,
    report_interval: Duration,
    mut submit: F,
) -> StrategyEngine
where
    F: FnMut(OrderIntent),
{
    let mut report = tokio::time::interval_at(tokio::time::Instant::now() + report_interval, report_interval);
    report.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            tick = ticks.recv() => {
                let Some(tick) = tick else { break };
                if let Some(intent) = engine.on_tick(&tick) {
                    info!("[strategy] placing {} order for {}", intent.side, intent.size);
                    submit(intent);
                }
            }
            _ = report.tick() => {
                info!("[strategy] position={:?} report: {}", engine.position(), engine.report());
            }
        }
    }

    info!("[strategy] tick channel closed after {} ticks", engine.evaluated_ticks());
    engine
}
