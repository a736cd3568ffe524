//! Kraken public WebSocket (v1) protocol.
//!
//! - [`json_parser`]: inbound frame decoding into [`FeedEvent`]s and the
//!   outbound `subscribe` / `ping` / `pong` builders.

pub mod json_parser;

pub use json_parser::{FeedEvent, decode, ping_message, pong_message, subscribe_message};
