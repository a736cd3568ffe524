//! # kbot-strategy
//!
//! SMA crossover strategy with stop-loss / take-profit exits.
//!
//! - [`sma`]: incremental fixed-window moving average
//! - [`engine`]: the position state machine, fed one tick at a time
//! - [`metrics`]: performance report derived from the closed-trade log
//! - [`backtest`]: replay a ledger snapshot through a fresh engine
//! - [`task`]: the async loop that drives the engine from the feed channel

pub mod backtest;
pub mod engine;
pub mod metrics;
pub mod sma;
pub mod task;

pub use engine::{Position, StrategyEngine};
pub use metrics::PerformanceReport;
