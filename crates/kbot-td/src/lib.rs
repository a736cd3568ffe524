//! # kbot-td
//!
//! Order execution for the trading bot.
//!
//! Every venue adapter implements [`OrderGateway`]. The strategy never calls a
//! gateway directly: intents go through an [`OrderDispatcher`], which runs
//! orders one at a time on its own task so a slow venue never stalls tick
//! processing.
//!
//! | Gateway            | Module      | Notes                                  |
//! |--------------------|-------------|----------------------------------------|
//! | Kraken REST        | `kraken`    | signed `AddOrder`, market orders only  |
//! | Dry run            | `dry_run`   | logs the order, returns a synthetic ack |
//! | Retry wrapper      | `retry`     | timeout + bounded backoff over any gateway |

pub mod dispatcher;
pub mod dry_run;
pub mod error;
pub mod event;
pub mod kraken;
pub mod retry;

use async_trait::async_trait;
use kbot_core::types::{OrderAck, Side};

pub use dispatcher::OrderDispatcher;
pub use error::OrderError;
pub use event::{OrderEvent, OrderEventReceiver, OrderEventSender};

/// Places a fixed-size market order.
///
/// Implementations take `&self` so one gateway can be shared behind an `Arc`.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn place_order(&self, side: Side, size: f64) -> Result<OrderAck, OrderError>;
}

