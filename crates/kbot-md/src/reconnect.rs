//! Reconnect schedule for the feed session.
//!
//! The default is the venue-friendly fixed delay, retried forever. The
//! exponential variant doubles the delay up to a cap and can give up after a
//! retry budget; both are chosen explicitly in config.

use std::time::Duration;

use kbot_core::config::ReconnectConfig;

/// Stateful delay generator. Call [`next_delay`](Self::next_delay) after each
/// failed or ended connection and [`reset`](Self::reset) once a connection
/// reaches the subscribed state.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempts: 0 }
    }

    /// Delay before the next attempt, or `None` when the retry budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let attempt = self.attempts;
        self.attempts = self.attempts.saturating_add(1);

        match self.config {
            ReconnectConfig::Fixed { delay_secs } => Some(Duration::from_secs(delay_secs)),
            ReconnectConfig::Exponential { initial_secs, max_secs, max_retries } => {
                if max_retries.is_some_and(|max| attempt >= max) {
                    return None;
                }
                let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
                Some(Duration::from_secs(initial_secs.saturating_mul(factor).min(max_secs)))
            }
        }
    }

    /// Consecutive attempts since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
