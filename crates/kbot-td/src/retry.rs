//! Timeout and bounded retry around any [`OrderGateway`].

use std::time::Duration;

use async_trait::async_trait;
use kbot_core::config::TradingConfig;
use kbot_core::types::{OrderAck, Side};
use tracing::warn;

use crate::OrderGateway;
use crate::error::OrderError;

/// Wraps a gateway with a per-attempt timeout. Transport failures and
/// timeouts are retried up to `max_attempts` in total, with the delay
/// doubling after each failure. Rejections are returned immediately.
pub struct RetryingGateway<G> {
    inner: G,
    timeout: Duration,
    max_attempts: u32,
    backoff: Duration,
}

impl<G: OrderGateway> RetryingGateway<G> {
    pub fn new(inner: G, timeout: Duration, max_attempts: u32, backoff: Duration) -> Self {
        Self { inner, timeout, max_attempts: max_attempts.max(1), backoff }
    }

    pub fn from_config(inner: G, cfg: &TradingConfig) -> Self {
        Self::new(
            inner,
            Duration::from_millis(cfg.request_timeout_ms),
            cfg.max_attempts,
            Duration::from_millis(cfg.retry_backoff_ms),
        )
    }
}

#[async_trait]
impl<G: OrderGateway> OrderGateway for RetryingGateway<G> {
    async fn place_order(&self, side: Side, size: f64) -> Result<OrderAck, OrderError> {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, self.inner.place_order(side, size)).await {
                Ok(result) => result,
                Err(_) => Err(OrderError::Timeout(self.timeout.as_millis() as u64)),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!("[orders] {side} {size} attempt {attempt}/{} failed: {e}, retrying in {delay:?}", self.max_attempts);
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
