//! # kbot-core
//!
//! Core crate for the Kraken SMA trading bot, providing:
//!
//! - **Types** (`types`): ticks, sides, order intents, trade records, connection states
//! - **Trade ledger** (`ledger`): append-only tick history with cheap point-in-time snapshots
//! - **Configuration** (`config`): JSON config deserialization with defaults
//! - **Error types** (`error`): domain-specific `KbotError` via thiserror
//! - **WebSocket** (`ws`): transport abstraction, tungstenite connector, guarded write handle
//! - **Time utilities** (`time_util`): microsecond timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
