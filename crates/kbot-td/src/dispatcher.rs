//! Non-blocking order submission.
//!
//! [`OrderDispatcher::submit`] never waits: it pushes the intent onto a
//! bounded queue and returns. A single worker task drains the queue and
//! places orders strictly in submission order, so at most one order is in
//! flight at any time. Every intent that reaches the worker is attempted at
//! least once; every outcome (including intents dropped on a full queue) is
//! logged and published as an [`OrderEvent`].

use std::sync::Arc;

use kbot_core::types::OrderIntent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::OrderGateway;
use crate::event::{OrderEvent, OrderEventReceiver, OrderEventSender};

pub struct OrderDispatcher {
    tx: mpsc::Sender<OrderIntent>,
    events: OrderEventSender,
    task: JoinHandle<()>,
}

impl OrderDispatcher {
    /// Spawn the worker. Returns the dispatcher and the receiving end of its
    /// event channel.
    pub fn spawn(gateway: Arc<dyn OrderGateway>, capacity: usize) -> (Self, OrderEventReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (events, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(worker(gateway, rx, events.clone()));
        (Self { tx, events, task }, events_rx)
    }

    /// Queue an intent without waiting. Returns `false` if it was dropped.
    pub fn submit(&self, intent: OrderIntent) -> bool {
        match self.tx.try_send(intent) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(intent)) => {
                error!("[orders] queue full, dropping {} {} order", intent.side, intent.size);
                let _ = self.events.send(OrderEvent::Dropped { intent });
                false
            }
            Err(mpsc::error::TrySendError::Closed(intent)) => {
                error!("[orders] dispatcher stopped, dropping {} {} order", intent.side, intent.size);
                let _ = self.events.send(OrderEvent::Dropped { intent });
                false
            }
        }
    }

    /// A cheap handle for submitting from another task.
    pub fn submitter(&self) -> OrderSubmitter {
        OrderSubmitter { tx: self.tx.clone(), events: self.events.clone() }
    }

    /// Stop accepting intents, let the worker finish what is queued, and wait
    /// for it. Outstanding [`OrderSubmitter`]s must be dropped first.
    pub async fn shutdown(self) {
        let Self { tx, events, task } = self;
        drop(tx);
        drop(events);
        if let Err(e) = task.await {
            error!("[orders] worker task failed: {e}");
        }
    }
}

/// Clonable submit-only view of an [`OrderDispatcher`].
#[derive(Clone)]
pub struct OrderSubmitter {
    tx: mpsc::Sender<OrderIntent>,
    events: OrderEventSender,
}

impl OrderSubmitter {
    /// See [`OrderDispatcher::submit`].
    pub fn submit(&self, intent: OrderIntent) -> bool {
        match self.tx.try_send(intent) {
            Ok(()) => true,
            Err(e) => {
                let intent = e.into_inner();
                error!("[orders] cannot queue {} {} order, dropping", intent.side, intent.size);
                let _ = self.events.send(OrderEvent::Dropped { intent });
                false
            }
        }
    }
}

async fn worker(gateway: Arc<dyn OrderGateway>, mut rx: mpsc::Receiver<OrderIntent>, events: OrderEventSender) {
    while let Some(intent) = rx.recv().await {
        let event = match gateway.place_order(intent.side, intent.size).await {
            Ok(ack) => {
                info!("[orders] {} order placed: {}", intent.side, ack.raw);
                OrderEvent::Placed { intent, ack }
            }
            Err(error) => {
                error!("[orders] error placing {} order: {error}", intent.side);
                OrderEvent::Failed { intent, error }
            }
        };
        let _ = events.send(event);
    }
    info!("[orders] worker stopped");
}
