//! Guarded write access to one live connection.
//!
//! A connection's write half is owned by a single writer task. Everyone else
//! (the dispatch loop answering heartbeats, the keepalive loop sending
//! pings) writes through a cloneable [`LinkHandle`]. The handle carries the
//! one shared `open` flag: it is cleared when the writer fails or when the
//! owner tears the connection down, and every send checks it first, so
//! nobody writes to a connection that is known to be dead.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::client::{FrameSink, WsFrame};
use crate::error::KbotError;

/// Outbound queue depth per connection.
const OUTBOUND_CAPACITY: usize = 64;

/// How long teardown waits for the writer to flush its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Cloneable write handle for one connection.
#[derive(Clone)]
pub struct LinkHandle {
    open: Arc<AtomicBool>,
    tx: mpsc::Sender<WsFrame>,
}

impl LinkHandle {
    /// Whether the connection is still considered alive.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Queue a frame for sending. Fails with [`KbotError::NotOpen`] once the
    /// connection has been marked closed.
    pub async fn send(&self, frame: WsFrame) -> Result<(), KbotError> {
        if !self.is_open() {
            return Err(KbotError::NotOpen);
        }
        self.tx.send(frame).await.map_err(|_| KbotError::NotOpen)
    }

    pub async fn send_text(&self, text: String) -> Result<(), KbotError> {
        self.send(WsFrame::Text(text)).await
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }
}

/// Owner side of a connection's write half.
///
/// Dropping the last [`LinkHandle`] lets the writer drain, send a close
/// frame and exit; [`LinkWriter::shutdown`] does that deterministically.
pub struct LinkWriter {
    handle: LinkHandle,
    /// `None` once the task has been awaited to completion.
    task: Option<JoinHandle<()>>,
}

impl LinkWriter {
    /// Spawn the writer task for `sink`. `label` prefixes log lines.
    pub fn spawn(mut sink: Box<dyn FrameSink>, label: String) -> Self {
        let (tx, mut rx) = mpsc::channel::<WsFrame>(OUTBOUND_CAPACITY);
        let open = Arc::new(AtomicBool::new(true));
        let handle = LinkHandle { open: Arc::clone(&open), tx };

        let task = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = sink.send(frame).await {
                    error!("[{label}] write failed: {e}");
                    break;
                }
            }
            open.store(false, Ordering::Release);
            rx.close();
            if let Err(e) = sink.close().await {
                debug!("[{label}] close: {e}");
            }
        });

        Self { handle, task: Some(task) }
    }

    /// A new handle onto this connection.
    pub fn handle(&self) -> LinkHandle {
        self.handle.clone()
    }

    /// Whether the writer task has exited (normally because a write failed).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait until the writer task exits. Cancel-safe.
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.as_mut() {
            let _ = task.await;
            self.task = None;
        }
    }

    /// Mark the connection closed, then let the writer flush and close the
    /// sink. Any other handles must already have been dropped for the writer
    /// to observe end-of-queue; otherwise it is aborted after a grace period.
    pub async fn shutdown(self) {
        let Self { handle, task } = self;
        handle.mark_closed();
        drop(handle);

        let Some(task) = task else { return };
        let abort = task.abort_handle();
        if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
            warn!("writer did not exit within {CLOSE_GRACE:?}, aborting");
            abort.abort();
        }
    }
}
