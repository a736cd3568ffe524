//! SMA crossover state machine.
//!
//! The engine is fed ticks in ledger order. For every tick it updates the
//! fast and slow windows (the current price included) and, once both are
//! defined, applies at most one transition:
//!
//! | Position | Condition                         | Action                           |
//! |----------|-----------------------------------|----------------------------------|
//! | Flat     | fast > slow                       | enter Long, emit buy             |
//! | Flat     | fast < slow                       | enter Short, emit sell           |
//! | Long     | price <= entry * (1 - stop)       | exit (StopLoss), emit sell       |
//! | Long     | price >= entry * (1 + target)     | exit (TakeProfit), emit sell     |
//! | Long     | price < fast                      | exit (TrendReversal), emit sell  |
//! | Short    | price >= entry * (1 + stop)       | exit (StopLoss), emit buy        |
//! | Short    | price <= entry * (1 - target)     | exit (TakeProfit), emit buy      |
//! | Short    | price > fast                      | exit (TrendReversal), emit buy   |
//!
//! Exit rows are checked top to bottom. Position changes and trade records
//! are committed before the intent is handed off, whether or not the venue
//! later accepts the order.

use kbot_core::config::StrategyConfig;
use kbot_core::types::{ExitReason, OrderIntent, PositionSide, Side, Tick, TradeRecord};
use tracing::info;

use crate::metrics::PerformanceReport;
use crate::sma::SmaWindow;

/// Current holding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    Flat,
    Long { entry_price: f64, entry_time_us: u64 },
    Short { entry_price: f64, entry_time_us: u64 },
}

impl Position {
    pub fn is_flat(&self) -> bool {
        matches!(self, Self::Flat)
    }
}

pub struct StrategyEngine {
    config: StrategyConfig,
    fast: SmaWindow,
    slow: SmaWindow,
    position: Position,
    records: Vec<TradeRecord>,
    evaluated_ticks: u64,
}

impl StrategyEngine {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            fast: SmaWindow::new(config.fast_window),
            slow: SmaWindow::new(config.slow_window),
            config,
            position: Position::Flat,
            records: Vec::new(),
            evaluated_ticks: 0,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Closed trades, oldest first.
    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    /// Number of ticks fed through [`on_tick`](Self::on_tick), including the
    /// warm-up ticks before both averages were defined.
    pub fn evaluated_ticks(&self) -> u64 {
        self.evaluated_ticks
    }

    /// Latest `(fast, slow)` averages, if both are defined.
    pub fn averages(&self) -> Option<(f64, f64)> {
        Some((self.fast.value()?, self.slow.value()?))
    }

    pub fn report(&self) -> PerformanceReport {
        PerformanceReport::from_trades(&self.records, self.evaluated_ticks)
    }

    /// Back to Flat with empty windows and no history.
    pub fn reset(&mut self) {
        self.fast.clear();
        self.slow.clear();
        self.position = Position::Flat;
        self.records.clear();
        self.evaluated_ticks = 0;
    }

    /// Feed one tick. Returns the order to place, if the tick caused a
    /// transition.
    pub fn on_tick(&mut self, tick: &Tick) -> Option<OrderIntent> {
        self.evaluated_ticks += 1;
        self.fast.push(tick.price);
        self.slow.push(tick.price);

        let (fast, slow) = self.averages()?;
        let price = tick.price;
        let cfg = &self.config;

        match self.position {
            Position::Flat => {
                let side = if fast > slow {
                    PositionSide::Long
                } else if fast < slow {
                    PositionSide::Short
                } else {
                    return None;
                };
                self.position = match side {
                    PositionSide::Long => Position::Long { entry_price: price, entry_time_us: tick.timestamp_us },
                    PositionSide::Short => Position::Short { entry_price: price, entry_time_us: tick.timestamp_us },
                };
                info!("[strategy] entered {side:?} at {price} (fast={fast:.8} slow={slow:.8})");
                Some(self.intent(side.entry_side()))
            }
            Position::Long { entry_price, entry_time_us } => {
                let reason = if price <= entry_price * (1.0 - cfg.long_stop_loss) {
                    ExitReason::StopLoss
                } else if price >= entry_price * (1.0 + cfg.long_take_profit) {
                    ExitReason::TakeProfit
                } else if price < fast {
                    ExitReason::TrendReversal
                } else {
                    return None;
                };
                Some(self.exit(PositionSide::Long, entry_price, entry_time_us, tick, reason))
            }
            Position::Short { entry_price, entry_time_us } => {
                let reason = if price >= entry_price * (1.0 + cfg.short_stop_loss) {
                    ExitReason::StopLoss
                } else if price <= entry_price * (1.0 - cfg.short_take_profit) {
                    ExitReason::TakeProfit
                } else if price > fast {
                    ExitReason::TrendReversal
                } else {
                    return None;
                };
                Some(self.exit(PositionSide::Short, entry_price, entry_time_us, tick, reason))
            }
        }
    }

    fn exit(
        &mut self,
        side: PositionSide,
        entry_price: f64,
        entry_time_us: u64,
        tick: &Tick,
        reason: ExitReason,
    ) -> OrderIntent {
        let pnl = match side {
            PositionSide::Long => tick.price - entry_price,
            PositionSide::Short => entry_price - tick.price,
        };
        let record = TradeRecord {
            entry_time_us,
            exit_time_us: tick.timestamp_us,
            side,
            entry_price,
            exit_price: tick.price,
            pnl,
            reason,
        };
        info!("[strategy] exited {side:?} at {} due to {reason}, pnl={pnl:.8}", tick.price);
        self.records.push(record);
        self.position = Position::Flat;
        self.intent(side.exit_side())
    }

    fn intent(&self, side: Side) -> OrderIntent {
        OrderIntent { side, size: self.config.order_size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> StrategyEngine {
        StrategyEngine::new(StrategyConfig::default())
    }

    fn ticks(prices: impl IntoIterator<Item = f64>) -> Vec<Tick> {
        prices.into_iter().enumerate().map(|(i, p)| Tick::new(i as u64 * 1_000_000, p, 1.0)).collect()
    }

    fn run(engine: &mut StrategyEngine, ticks: &[Tick]) -> Vec<OrderIntent> {
        ticks.iter().filter_map(|t| engine.on_tick(t)).collect()
    }

    fn rising() -> Vec<f64> {
        (0..200).map(|i| 100.0 + i as f64 * 0.01).collect()
    }

    fn falling() -> Vec<f64> {
        (0..200).map(|i| 200.0 - i as f64 * 0.01).collect()
    }

    #[test]
    fn no_action_during_warm_up() {
        let mut e = engine();
        let warm = ticks((0..199).map(|i| 100.0 + i as f64));
        assert!(run(&mut e, &warm).is_empty());
        assert!(e.position().is_flat());
        assert_eq!(e.evaluated_ticks(), 199);
        assert_eq!(e.averages(), None);
    }

    #[test]
    fn equal_averages_stay_flat() {
        let mut e = engine();
        assert!(run(&mut e, &ticks(std::iter::repeat_n(50.0, 300))).is_empty());
        assert!(e.position().is_flat());
    }

    #[test]
    fn long_take_profit_round_trip() {
        let mut e = engine();
        let mut prices = rising();
        let entry = *prices.last().unwrap();
        let exit = entry * 1.04;
        prices.push(exit);

        let intents = run(&mut e, &ticks(prices));
        assert_eq!(
            intents,
            vec![OrderIntent { side: Side::Buy, size: 0.001 }, OrderIntent { side: Side::Sell, size: 0.001 }]
        );
        assert!(e.position().is_flat());

        let [record] = e.records() else { panic!("expected one trade, got {:?}", e.records()) };
        assert_eq!(record.side, PositionSide::Long);
        assert_eq!(record.reason, ExitReason::TakeProfit);
        assert_eq!(record.entry_price, entry);
        assert_eq!(record.exit_price, exit);
        assert_eq!(record.pnl, exit - entry);
        assert_eq!(record.entry_time_us, 199_000_000);
        assert_eq!(record.exit_time_us, 200_000_000);
    }

    #[test]
    fn take_profit_fires_exactly_at_threshold() {
        let mut e = engine();
        let mut prices = rising();
        let entry = *prices.last().unwrap();
        prices.push(entry * (1.0 + StrategyConfig::default().long_take_profit));
        run(&mut e, &ticks(prices));
        assert_eq!(e.records()[0].reason, ExitReason::TakeProfit);
    }

    #[test]
    fn short_stop_loss_round_trip() {
        let mut e = engine();
        let mut prices = falling();
        let entry = *prices.last().unwrap();
        let exit = entry * 1.025;
        prices.push(exit);

        let intents = run(&mut e, &ticks(prices));
        assert_eq!(intents.iter().map(|i| i.side).collect::<Vec<_>>(), vec![Side::Sell, Side::Buy]);

        let [record] = e.records() else { panic!("expected one trade") };
        assert_eq!(record.side, PositionSide::Short);
        assert_eq!(record.reason, ExitReason::StopLoss);
        assert_eq!(record.pnl, entry - exit);
        assert!(record.pnl < 0.0);
    }

    #[test]
    fn long_stop_loss_wins_over_trend_reversal() {
        let mut e = engine();
        let mut prices = rising();
        let entry = *prices.last().unwrap();
        // Below the fast average as well, but stop-loss is checked first.
        prices.push(entry * 0.97);
        run(&mut e, &ticks(prices));
        assert_eq!(e.records()[0].reason, ExitReason::StopLoss);
    }

    #[test]
    fn long_exits_on_trend_reversal() {
        let mut e = engine();
        let mut prices = rising();
        let entry = *prices.last().unwrap();
        prices.push(entry - 1.0);
        let intents = run(&mut e, &ticks(prices));
        assert_eq!(intents.len(), 2);
        assert_eq!(e.records()[0].reason, ExitReason::TrendReversal);
        assert!(e.records()[0].pnl < 0.0);
    }

    #[test]
    fn short_take_profit_and_trend_reversal() {
        let mut e = engine();
        let mut prices = falling();
        let entry = *prices.last().unwrap();
        prices.push(entry * 0.96);
        run(&mut e, &ticks(prices));
        assert_eq!(e.records()[0].reason, ExitReason::TakeProfit);
        assert!(e.records()[0].pnl > 0.0);

        let mut e = engine();
        let mut prices = falling();
        let entry = *prices.last().unwrap();
        prices.push(entry + 1.0);
        run(&mut e, &ticks(prices));
        assert_eq!(e.records()[0].reason, ExitReason::TrendReversal);
    }

    #[test]
    fn holds_position_while_no_exit_condition() {
        let mut e = engine();
        let mut prices = rising();
        // Keep rising gently: above fast, below take-profit.
        prices.extend((1..10).map(|i| 101.99 + i as f64 * 0.01));
        let intents = run(&mut e, &ticks(prices));
        assert_eq!(intents.len(), 1);
        assert!(matches!(e.position(), Position::Long { .. }));
        assert!(e.records().is_empty());
    }

    #[test]
    fn one_transition_per_tick() {
        let mut e = engine();
        let mut prices = rising();
        let entry = *prices.last().unwrap();
        prices.push(entry * 1.05);
        let t = ticks(prices);
        let intents = run(&mut e, &t);
        // The exit tick does not immediately re-enter even though fast > slow.
        assert_eq!(intents.len(), 2);
        assert!(e.position().is_flat());

        // The next tick may re-enter.
        let next = Tick::new(t.last().unwrap().timestamp_us + 1, entry * 1.05, 1.0);
        assert_eq!(e.on_tick(&next).map(|i| i.side), Some(Side::Buy));
    }

    #[test]
    fn reset_clears_everything() {
        let mut e = engine();
        let mut prices = rising();
        prices.push(prices[199] * 1.04);
        run(&mut e, &ticks(prices));
        e.reset();
        assert!(e.position().is_flat());
        assert!(e.records().is_empty());
        assert_eq!(e.evaluated_ticks(), 0);
        assert_eq!(e.averages(), None);
    }
}
