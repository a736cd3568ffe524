//! Configuration parsing for the trading bot.
//!
//! Settings come from a single JSON file. Every field has a default, so an
//! empty object is a valid config. API credentials are never read from this
//! file; the runner pulls them from the environment.
//!
//! # Example config
//!
//! ```json
//! {
//!   "logging":  { "level": "info", "dir": "/var/log/kbot", "file_prefix": "trading_bot" },
//!   "feed":     { "url": "wss://ws.kraken.com", "pair": "XBT/USD",
//!                 "reconnect": { "kind": "fixed", "delay_secs": 5 } },
//!   "strategy": { "fast_window": 50, "slow_window": 200 },
//!   "trading":  { "dry_run": true }
//! }
//! ```

use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::error::KbotError;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub feed: FeedConfig,
    pub strategy: StrategyConfig,
    pub trading: TradingConfig,
}

impl AppConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), KbotError> {
        let url = url::Url::parse(&self.feed.url)
            .map_err(|e| KbotError::Config(format!("feed.url '{}': {e}", self.feed.url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(KbotError::Config(format!("feed.url must be ws:// or wss://, got '{}'", self.feed.url)));
        }
        if self.feed.pair.trim().is_empty() {
            return Err(KbotError::Config("feed.pair must not be empty".into()));
        }
        if self.feed.ping_interval_secs == 0 {
            return Err(KbotError::Config("feed.ping_interval_secs must be positive".into()));
        }
        if self.feed.tick_channel_capacity == 0 {
            return Err(KbotError::Config("feed.tick_channel_capacity must be positive".into()));
        }
        let s = &self.strategy;
        if s.fast_window == 0 || s.slow_window == 0 {
            return Err(KbotError::Config("strategy windows must be positive".into()));
        }
        if s.fast_window >= s.slow_window {
            return Err(KbotError::Config(format!(
                "strategy.fast_window ({}) must be shorter than slow_window ({})",
                s.fast_window, s.slow_window
            )));
        }
        for (name, v) in [
            ("long_stop_loss", s.long_stop_loss),
            ("long_take_profit", s.long_take_profit),
            ("short_stop_loss", s.short_stop_loss),
            ("short_take_profit", s.short_take_profit),
        ] {
            if !(v > 0.0 && v < 1.0) {
                return Err(KbotError::Config(format!("strategy.{name} must be in (0, 1), got {v}")));
            }
        }
        if !(s.order_size > 0.0) {
            return Err(KbotError::Config("strategy.order_size must be positive".into()));
        }
        if self.trading.max_attempts == 0 {
            return Err(KbotError::Config("trading.max_attempts must be at least 1".into()));
        }
        if self.trading.queue_capacity == 0 {
            return Err(KbotError::Config("trading.queue_capacity must be positive".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for daily-rotating log files; console only when absent.
    pub dir: Option<String>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), dir: None, file_prefix: "trading_bot".into() }
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// Streaming feed settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Instrument pair to subscribe (e.g. `"XBT/USD"`).
    pub pair: String,
    /// Interval between outbound pings; staleness is declared after twice this.
    pub ping_interval_secs: u64,
    pub reconnect: ReconnectConfig,
    /// Capacity of the bounded tick channel feeding the strategy.
    pub tick_channel_capacity: usize,
    /// Keep at least this many recent ticks in the ledger; unbounded if absent.
    pub ledger_retention: Option<usize>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://ws.kraken.com".into(),
            pair: "XBT/USD".into(),
            ping_interval_secs: 30,
            reconnect: ReconnectConfig::default(),
            tick_channel_capacity: 4096,
            ledger_retention: None,
        }
    }
}

impl FeedConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

/// Reconnect schedule after a connection ends.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReconnectConfig {
    /// Same delay before every attempt, retried forever.
    Fixed { delay_secs: u64 },
    /// Doubling delay capped at `max_secs`; gives up after `max_retries`
    /// consecutive failures when set.
    Exponential { initial_secs: u64, max_secs: u64, max_retries: Option<u32> },
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::Fixed { delay_secs: 5 }
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// SMA crossover parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub fast_window: usize,
    pub slow_window: usize,
    /// Long exits when price <= entry * (1 - long_stop_loss).
    pub long_stop_loss: f64,
    /// Long exits when price >= entry * (1 + long_take_profit).
    pub long_take_profit: f64,
    /// Short exits when price >= entry * (1 + short_stop_loss).
    pub short_stop_loss: f64,
    /// Short exits when price <= entry * (1 - short_take_profit).
    pub short_take_profit: f64,
    /// Fixed order size for every intent.
    pub order_size: f64,
    /// How often the runner logs the performance report.
    pub report_interval_secs: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            fast_window: 50,
            slow_window: 200,
            long_stop_loss: 0.02,
            long_take_profit: 0.03,
            short_stop_loss: 0.02,
            short_take_profit: 0.03,
            order_size: 0.001,
            report_interval_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Trading
// ---------------------------------------------------------------------------

/// Order gateway settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Kraken REST base URL.
    pub rest_url: String,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
    /// Total attempts per order, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff_ms: u64,
    /// Capacity of the outgoing order queue.
    pub queue_capacity: usize,
    /// Log orders instead of sending them.
    pub dry_run: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            rest_url: "https://api.kraken.com".into(),
            request_timeout_ms: 10_000,
            max_attempts: 3,
            retry_backoff_ms: 500,
            queue_capacity: 16,
            dry_run: false,
        }
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let config: AppConfig =
        serde_json::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let cfg: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.feed.url, "wss://ws.kraken.com");
        assert_eq!(cfg.feed.pair, "XBT/USD");
        assert_eq!(cfg.feed.ping_interval_secs, 30);
        assert_eq!(cfg.feed.reconnect, ReconnectConfig::Fixed { delay_secs: 5 });
        assert_eq!(cfg.strategy.fast_window, 50);
        assert_eq!(cfg.strategy.slow_window, 200);
        assert_eq!(cfg.strategy.order_size, 0.001);
        assert!(!cfg.trading.dry_run);
        cfg.validate().unwrap();
    }

    #[test]
    fn parses_exponential_reconnect() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{"feed": {"pair": "ETH/USD",
                "reconnect": {"kind": "exponential", "initial_secs": 1, "max_secs": 60, "max_retries": 10}}}"#,
        )
        .unwrap();
        assert_eq!(cfg.feed.pair, "ETH/USD");
        assert_eq!(
            cfg.feed.reconnect,
            ReconnectConfig::Exponential { initial_secs: 1, max_secs: 60, max_retries: Some(10) }
        );
    }

    #[test]
    fn rejects_inverted_windows() {
        let mut cfg = AppConfig::default();
        cfg.strategy.fast_window = 200;
        cfg.strategy.slow_window = 50;
        assert!(matches!(cfg.validate(), Err(KbotError::Config(_))));
    }

    #[test]
    fn rejects_non_websocket_url() {
        let mut cfg = AppConfig::default();
        cfg.feed.url = "https://ws.kraken.com".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let mut cfg = AppConfig::default();
        cfg.strategy.long_take_profit = 1.5;
        assert!(cfg.validate().is_err());
    }
}
