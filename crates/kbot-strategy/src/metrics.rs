//! Performance report over the closed-trade log.
//!
//! Everything here is a pure function of `&[TradeRecord]` and the evaluated
//! tick count, recomputed from scratch on every call.

use std::fmt;

use kbot_core::types::TradeRecord;

const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub trades: usize,
    pub evaluated_ticks: u64,
    pub total_pnl: f64,
    /// Running sum of per-trade pnl, one entry per trade.
    pub cumulative_pnl: Vec<f64>,
    /// Largest drop from a running peak of cumulative pnl (starting at 0).
    pub max_drawdown: f64,
    /// `mean(pnl) / stddev(pnl) * sqrt(365)` with the sample standard
    /// deviation. NaN with fewer than two trades or zero dispersion.
    pub sharpe_ratio: f64,
    /// `total_pnl / evaluated_ticks * 365`. A simple non-compounding
    /// approximation; NaN before any tick was evaluated.
    pub annualized_return: f64,
    /// Share of trades with positive pnl. NaN without trades.
    pub win_rate: f64,
}

impl PerformanceReport {
    pub fn from_trades(records: &[TradeRecord], evaluated_ticks: u64) -> Self {
        let pnl: Vec<f64> = records.iter().map(|r| r.pnl).collect();
        let cumulative_pnl = cumulative(&pnl);
        let total_pnl = cumulative_pnl.last().copied().unwrap_or(0.0);

        let annualized_return = if evaluated_ticks == 0 {
            f64::NAN
        } else {
            total_pnl / evaluated_ticks as f64 * DAYS_PER_YEAR
        };
        let win_rate = if pnl.is_empty() {
            f64::NAN
        } else {
            pnl.iter().filter(|&&p| p > 0.0).count() as f64 / pnl.len() as f64
        };

        Self {
            trades: records.len(),
            evaluated_ticks,
            total_pnl,
            max_drawdown: max_drawdown(&cumulative_pnl),
            sharpe_ratio: sharpe_ratio(&pnl),
            cumulative_pnl,
            annualized_return,
            win_rate,
        }
    }
}

impl fmt::Display for PerformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trades={} ticks={} pnl={:.8} max_drawdown={:.8} sharpe={:.4} annualized={:.8} win_rate={:.2}",
            self.trades,
            self.evaluated_ticks,
            self.total_pnl,
            self.max_drawdown,
            self.sharpe_ratio,
            self.annualized_return,
            self.win_rate
        )
    }
}

pub fn cumulative(pnl: &[f64]) -> Vec<f64> {
    pnl.iter()
        .scan(0.0, |acc, &p| {
            *acc += p;
            Some(*acc)
        })
        .collect()
}

/// Max over time of `running_peak - current`, with the peak seeded at 0.
pub fn max_drawdown(cumulative: &[f64]) -> f64 {
    let mut peak = 0.0_f64;
    let mut worst = 0.0_f64;
    for &c in cumulative {
        peak = peak.max(c);
        worst = worst.max(peak - c);
    }
    worst
}

pub fn sharpe_ratio(pnl: &[f64]) -> f64 {
    if pnl.len() < 2 || pnl.iter().all(|&p| p == pnl[0]) {
        return f64::NAN;
    }
    let n = pnl.len() as f64;
    let mean = pnl.iter().sum::<f64>() / n;
    let var = pnl.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std == 0.0 {
        return f64::NAN;
    }
    mean / std * DAYS_PER_YEAR.sqrt()
}
