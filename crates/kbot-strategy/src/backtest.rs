//! Replay stored trades through a fresh engine.
//!
//! Runs entirely offline: intents are collected, never sent.

use kbot_core::config::StrategyConfig;
use kbot_core::ledger::LedgerSnapshot;
use kbot_core::types::{OrderIntent, TradeRecord};

use crate::engine::StrategyEngine;
use crate::metrics::PerformanceReport;

#[derive(Debug, Clone)]
pub struct BacktestResult {
    /// Intents in the order they would have been placed, with the index of
    /// the tick that produced each.
    pub intents: Vec<(usize, OrderIntent)>,
    pub trades: Vec<TradeRecord>,
    pub report: PerformanceReport,
}

pub fn replay(snapshot: &LedgerSnapshot, config: &StrategyConfig) -> BacktestResult {
    let mut engine = StrategyEngine::new(config.clone());
    let intents = snapshot.iter().enumerate().filter_map(|(i, tick)| engine.on_tick(tick).map(|o| (i, o))).collect();
    BacktestResult { intents, trades: engine.records().to_vec(), report: engine.report() }
}

#[cfg(test)]
mod tests {
    use kbot_core::ledger::TradeLedger;
    use kbot_core::types::{Side, Tick};

    use super::*;

    #[test]
    fn replay_matches_live_engine() {
        let ledger = TradeLedger::new();
        let mut prices: Vec<f64> = (0..200).map(|i| 100.0 + i as f64 * 0.01).collect();
        prices.push(prices[199] * 1.04);
        prices.extend((0..200).map(|i| 110.0 - i as f64 * 0.02));

        let mut live = StrategyEngine::new(StrategyConfig::default());
        let mut live_intents = Vec::new();
        for (i, &p) in prices.iter().enumerate() {
            let tick = Tick::new(i as u64, p, 0.5);
            ledger.append(tick);
            if let Some(o) = live.on_tick(&tick) {
                live_intents.push((i, o));
            }
        }

        let result = replay(&ledger.snapshot(), &StrategyConfig::default());
        assert_eq!(result.intents, live_intents);
        assert_eq!(result.trades, live.records());
        assert_eq!(result.report.evaluated_ticks, prices.len() as u64);
        assert_eq!(result.intents[0], (199, OrderIntent { side: Side::Buy, size: 0.001 }));
    }

    #[test]
    fn empty_snapshot() {
        let result = replay(&TradeLedger::new().snapshot(), &StrategyConfig::default());
        assert!(result.intents.is_empty());
        assert!(result.trades.is_empty());
        assert!(result.report.annualized_return.is_nan());
    }
}
