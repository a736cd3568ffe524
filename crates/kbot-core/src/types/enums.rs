//! Enumerations used throughout the trading bot.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Order side
// ---------------------------------------------------------------------------

/// Buy or sell direction, both for observed trades and for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Wire representation used by the Kraken REST API (`type` field).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }

    /// Parse the single-letter side code Kraken puts in trade entries.
    pub fn from_kraken_code(code: &str) -> Option<Self> {
        match code {
            "b" => Some(Self::Buy),
            "s" => Some(Self::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Position bookkeeping
// ---------------------------------------------------------------------------

/// Direction of an open (or closed) position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that opens a position in this direction.
    pub fn entry_side(self) -> Side {
        match self {
            Self::Long => Side::Buy,
            Self::Short => Side::Sell,
        }
    }

    /// Order side that closes a position in this direction.
    pub fn exit_side(self) -> Side {
        match self {
            Self::Long => Side::Sell,
            Self::Short => Side::Buy,
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrendReversal,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop loss"),
            Self::TakeProfit => write!(f, "take profit"),
            Self::TrendReversal => write!(f, "trend reversal"),
        }
    }
}

// ---------------------------------------------------------------------------
// Feed connection state
// ---------------------------------------------------------------------------

/// Lifecycle state of the streaming feed connection.
///
/// Exactly one feed session owns (and mutates) this value; everyone else
/// observes it through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Subscribing,
    Subscribed,
    /// Subscribed, but no keepalive activity for two heartbeat intervals.
    Degraded,
    Closing,
}

impl ConnectionState {
    /// Whether ticks can currently arrive on this connection.
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Subscribed | Self::Degraded)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribing => "subscribing",
            Self::Subscribed => "subscribed",
            Self::Degraded => "degraded",
            Self::Closing => "closing",
        };
        f.write_str(s)
    }
}
