//! Typed error definitions for the trading bot.
//!
//! [`KbotError`] mirrors the failure taxonomy the feed and strategy layers
//! act on: decode failures drop a single message, transport and subscription
//! failures drive the reconnect policy. Order placement has its own error
//! type next to the gateways.
//! Application plumbing wraps these in `anyhow::Result`.

use thiserror::Error;

/// Domain-specific errors for the trading bot.
#[derive(Debug, Error)]
pub enum KbotError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Malformed or unexpected message shape. The raw text is kept so the
    /// message can be replayed when debugging.
    #[error("decode error: {reason} (raw: {raw})")]
    Decode { reason: String, raw: String },

    /// Connection-level failure: handshake, read, write or close.
    #[error("transport error: {0}")]
    Transport(String),

    /// A write was attempted on a connection that is no longer open.
    #[error("connection is not open")]
    NotOpen,

    /// The venue rejected the subscription request.
    #[error("subscription rejected: {0}")]
    Subscription(String),
}

impl KbotError {
    /// Build a [`KbotError::Decode`] from a reason and the offending payload.
    pub fn decode(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Decode { reason: reason.into(), raw: raw.into() }
    }

    /// Whether this error ends the current connection.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotOpen | Self::Subscription(_))
    }
}
