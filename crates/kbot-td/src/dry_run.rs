//! Gateway that only logs.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use kbot_core::types::{OrderAck, Side};
use tracing::info;

use crate::OrderGateway;
use crate::error::OrderError;

/// Accepts every order without contacting the venue.
#[derive(Debug, Default)]
pub struct DryRunGateway {
    pair: String,
    seq: AtomicU64,
}

impl DryRunGateway {
    pub fn new(pair: impl Into<String>) -> Self {
        Self { pair: pair.into(), seq: AtomicU64::new(0) }
    }
}

#[async_trait]
impl OrderGateway for DryRunGateway {
    async fn place_order(&self, side: Side, size: f64) -> Result<OrderAck, OrderError> {
        let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let description = format!("{side} {size} {} @ market", self.pair);
        info!("[dry-run] would place order #{n}: {description}");
        Ok(OrderAck {
            txids: vec![format!("DRYRUN-{n}")],
            raw: serde_json::json!({"dry_run": true, "descr": {"order": description}}),
            description: Some(description),
        })
    }
}
