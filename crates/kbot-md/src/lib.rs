//! # kbot-md
//!
//! Market data side of the bot: the Kraken WebSocket codec and the
//! [`session::FeedSession`] that owns one streaming connection through its
//! whole lifecycle (connect, subscribe, heartbeat, dispatch, reconnect).
//!
//! ## Shared infrastructure
//!
//! - [`kraken`]: decode inbound frames, build outbound control messages
//! - [`reconnect`]: fixed or capped-exponential reconnect schedule
//! - [`json_util`]: JSON parsing helpers

pub mod json_util;
pub mod kraken;
pub mod reconnect;
pub mod session;

pub use session::{FeedHandle, FeedSession, FeedSessionConfig};
