//! Kraken trading gateway configuration.

use std::time::Duration;

use kbot_core::config::TradingConfig;

/// Credentials and endpoint for [`KrakenGateway`](super::KrakenGateway).
///
/// Credentials come from the environment, never from the JSON config file.
#[derive(Clone)]
pub struct KrakenTdConfig {
    pub api_key: String,
    /// Base64-encoded private key as issued by Kraken.
    pub api_secret: String,
    /// REST base URL (e.g. `https://api.kraken.com`).
    pub rest_url: String,
    /// Pair as sent in `AddOrder` (e.g. `XBTUSD`).
    pub pair: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl KrakenTdConfig {
    pub fn new(api_key: String, api_secret: String, pair: &str, trading: &TradingConfig) -> Self {
        Self {
            api_key,
            api_secret,
            rest_url: trading.rest_url.trim_end_matches('/').to_owned(),
            pair: rest_pair_name(pair),
            request_timeout: Duration::from_millis(trading.request_timeout_ms),
        }
    }
}

impl std::fmt::Debug for KrakenTdConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KrakenTdConfig")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("rest_url", &self.rest_url)
            .field("pair", &self.pair)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// REST pair name for a websocket pair name: `XBT/USD` -> `XBTUSD`.
pub fn rest_pair_name(ws_pair: &str) -> String {
    ws_pair.chars().filter(|c| *c != '/').collect()
}
