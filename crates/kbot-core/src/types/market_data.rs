//! Market data structures.
//!
//! # Timestamp convention
//!
//! All timestamps are in **microseconds since Unix epoch** (us). Kraken sends
//! fractional seconds; the codec converts on decode.

use serde::{Deserialize, Serialize};

use super::enums::Side;

/// A single observed trade. Immutable once decoded.
///
/// Prices and volumes are `f64`. Threshold checks built on them, such as a
/// stop at `entry * (1.0 - 0.02)`, are floating-point comparisons and can
/// differ from exact-decimal arithmetic in the last ulp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Exchange trade time.
    pub timestamp_us: u64,
    pub price: f64,
    pub volume: f64,
    /// Taker side, when the venue reports it.
    pub side: Option<Side>,
}

impl Tick {
    pub fn new(timestamp_us: u64, price: f64, volume: f64) -> Self {
        Self { timestamp_us, price, volume, side: None }
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = match self.side {
            Some(Side::Buy) => "BUY",
            Some(Side::Sell) => "SELL",
            None => "-",
        };
        write!(f, "Tick({side} {:.8}x{:.8} t={})", self.price, self.volume, self.timestamp_us)
    }
}
