//! Kraken JSON message codec.
//!
//! Inbound frames come in two shapes:
//!
//! - **Arrays**: channel data. A trade batch is
//!   `[channelID, [[price, volume, time, side, orderType, misc], ...], "trade", pair]`,
//!   optionally with a trailing fifth element.
//! - **Objects**: control events keyed by `event`: `heartbeat`, `pong`,
//!   `systemStatus`, `subscriptionStatus`, `error`.
//!
//! Unknown events decode to [`FeedEvent::Unrecognized`] so new venue
//! messages never break the session.

use kbot_core::error::KbotError;
use kbot_core::time_util;
use kbot_core::types::{Side, Tick};
use serde_json::{Value, json};

use crate::json_util::{parse_str_f64, parse_str_u64, str_field};

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Trades for `pair`. `skipped` counts malformed entries that were dropped.
    TradeBatch { pair: String, ticks: Vec<Tick>, skipped: usize },
    Heartbeat,
    Pong { reqid: Option<u64> },
    SubscriptionAck { pair: String, channel_id: Option<u64> },
    SubscriptionError { pair: Option<String>, message: String },
    SystemStatus { status: String, version: Option<String> },
    /// Venue-reported protocol error; ends the connection.
    ProtocolError { message: String },
    /// Well-formed but not understood; carries the raw text for the log.
    Unrecognized(String),
}

/// Decode one text frame.
///
/// Returns [`KbotError::Decode`] for invalid JSON and for arrays that do not
/// have the channel-data shape.
pub fn decode(text: &str) -> Result<FeedEvent, KbotError> {
    let v: Value = serde_json::from_str(text).map_err(|e| KbotError::decode(e.to_string(), text))?;

    match &v {
        Value::Array(items) => decode_channel_data(items, text),
        Value::Object(_) => Ok(decode_event(&v, text)),
        _ => Ok(FeedEvent::Unrecognized(text.to_owned())),
    }
}

/// Build the trade subscription request for `pair`.
pub fn subscribe_message(pair: &str) -> String {
    json!({
        "event": "subscribe",
        "subscription": {"name": "trade"},
        "pair": [pair]
    })
    .to_string()
}

/// Build a client ping. `reqid` is echoed back in the venue's pong.
pub fn ping_message(reqid: u64) -> String {
    json!({"event": "ping", "reqid": reqid}).to_string()
}

/// Build the acknowledgement sent in reply to a venue heartbeat.
pub fn pong_message() -> String {
    json!({"event": "pong"}).to_string()
}

// ---------------------------------------------------------------------------
// Channel data
// ---------------------------------------------------------------------------

fn decode_channel_data(items: &[Value], raw: &str) -> Result<FeedEvent, KbotError> {
    if !(4..=5).contains(&items.len()) {
        return Err(KbotError::decode(format!("channel message with {} elements", items.len()), raw));
    }

    let channel = items[2].as_str().ok_or_else(|| KbotError::decode("channel name is not a string", raw))?;
    if channel != "trade" {
        return Ok(FeedEvent::Unrecognized(raw.to_owned()));
    }

    let pair = items[3].as_str().ok_or_else(|| KbotError::decode("pair is not a string", raw))?;
    let entries = items[1].as_array().ok_or_else(|| KbotError::decode("trade payload is not an array", raw))?;
    if entries.is_empty() {
        return Err(KbotError::decode("empty trade payload", raw));
    }

    let mut ticks = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for entry in entries {
        match parse_trade_entry(entry) {
            Some(tick) => ticks.push(tick),
            None => skipped += 1,
        }
    }

    Ok(FeedEvent::TradeBatch { pair: pair.to_owned(), ticks, skipped })
}

/// `[price, volume, time, side, orderType, misc]`; only the first three are required.
fn parse_trade_entry(entry: &Value) -> Option<Tick> {
    let fields = entry.as_array()?;
    if fields.len() < 3 {
        return None;
    }

    let price = parse_str_f64(fields.first())?;
    let volume = parse_str_f64(fields.get(1))?;
    let timestamp_us = time_util::secs_to_us(parse_str_f64(fields.get(2))?)?;

    if !price.is_finite() || price <= 0.0 || !volume.is_finite() || volume < 0.0 {
        return None;
    }

    Some(Tick { timestamp_us, price, volume, side: fields.get(3).and_then(Value::as_str).and_then(Side::from_kraken_code) })
}

// ---------------------------------------------------------------------------
// Control events
// ---------------------------------------------------------------------------

fn decode_event(v: &Value, raw: &str) -> FeedEvent {
    match str_field(v, "event") {
        Some("heartbeat") => FeedEvent::Heartbeat,
        Some("pong") => FeedEvent::Pong { reqid: parse_str_u64(v.get("reqid")) },
        Some("systemStatus") => FeedEvent::SystemStatus {
            status: str_field(v, "status").unwrap_or("unknown").to_owned(),
            version: str_field(v, "version").map(str::to_owned),
        },
        Some("subscriptionStatus") => decode_subscription_status(v, raw),
        Some("error") => FeedEvent::ProtocolError {
            message: str_field(v, "errorMessage").map_or_else(|| raw.to_owned(), str::to_owned),
        },
        _ => FeedEvent::Unrecognized(raw.to_owned()),
    }
}

fn decode_subscription_status(v: &Value, raw: &str) -> FeedEvent {
    let pair = str_field(v, "pair").map(str::to_owned);
    match (str_field(v, "status"), pair) {
        (Some("subscribed"), Some(pair)) => {
            FeedEvent::SubscriptionAck { pair, channel_id: parse_str_u64(v.get("channelID")) }
        }
        (status, pair) => FeedEvent::SubscriptionError {
            pair,
            message: str_field(v, "errorMessage")
                .map(str::to_owned)
                .unwrap_or_else(|| format!("status={} ({raw})", status.unwrap_or("missing"))),
        },
    }
}
