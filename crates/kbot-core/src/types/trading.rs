//! Trading data structures: order intents, acks, and the trade log.
//!
//! These types flow from the strategy engine to the order gateway and back
//! into logging and performance reporting.

use serde::{Deserialize, Serialize};

use super::enums::{ExitReason, PositionSide, Side};

// ---------------------------------------------------------------------------
// Order intent (strategy → gateway)
// ---------------------------------------------------------------------------

/// An instruction to buy or sell a fixed size at market. Transient: it is
/// handed to the order dispatcher and not retained by the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub side: Side,
    pub size: f64,
}

// ---------------------------------------------------------------------------
// Order ack (gateway → logging)
// ---------------------------------------------------------------------------

/// Acknowledgement returned by the venue for an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    /// Venue transaction IDs assigned to the order.
    pub txids: Vec<String>,
    /// Human-readable order description echoed by the venue.
    pub description: Option<String>,
    /// Full response body, logged verbatim.
    pub raw: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Trade log
// ---------------------------------------------------------------------------

/// One closed position. Appended on every exit and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_time_us: u64,
    pub exit_time_us: u64,
    pub side: PositionSide,
    pub entry_price: f64,
    pub exit_price: f64,
    /// `exit - entry` for longs, `entry - exit` for shorts.
    pub pnl: f64,
    pub reason: ExitReason,
}

impl std::fmt::Display for TradeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} {:.8} -> {:.8} pnl={:.8} ({})",
            self.side, self.entry_price, self.exit_price, self.pnl, self.reason
        )
    }
}
