//! Order outcomes published by the [`OrderDispatcher`](crate::OrderDispatcher).

use kbot_core::types::{OrderAck, OrderIntent};

use crate::error::OrderError;

#[derive(Debug, Clone)]
pub enum OrderEvent {
    /// The venue accepted the order.
    Placed { intent: OrderIntent, ack: OrderAck },

    /// Every attempt failed. Strategy state was already committed.
    Failed { intent: OrderIntent, error: OrderError },

    /// The outgoing queue was full and the intent was never attempted.
    Dropped { intent: OrderIntent },
}

pub type OrderEventSender = tokio::sync::mpsc::UnboundedSender<OrderEvent>;

pub type OrderEventReceiver = tokio::sync::mpsc::UnboundedReceiver<OrderEvent>;
