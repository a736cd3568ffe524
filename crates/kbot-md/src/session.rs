//! Streaming feed session: one logical connection, run forever.
//!
//! A [`FeedSession`] runs as a tokio task that:
//! 1. Connects to the WebSocket endpoint and sends the trade subscription.
//! 2. Waits for the subscription acknowledgement for the configured pair.
//! 3. Decodes inbound frames, appends trades to the [`TradeLedger`] and
//!    forwards them to the strategy over a bounded channel.
//! 4. Answers venue heartbeats and runs a keepalive ping loop while
//!    subscribed, flagging the connection as degraded when it goes quiet.
//! 5. On any connection failure, discards all per-connection state and
//!    reconnects according to the [`ReconnectPolicy`].
//!
//! # State machine
//!
//! ```text
//! Disconnected ──► Connecting ──► Subscribing ──ack──► Subscribed ◄──► Degraded
//!       ▲              │               │                   │              │
//!       └──── delay ◄──┴── error ◄─────┴── close/error ◄───┴──────────────┘
//!
//! any state ──shutdown──► Closing ──► (task exits)
//! ```
//!
//! All ledger appends and tick forwarding happen on the dispatch loop, so
//! there is a single writer for everything downstream.

use std::sync::Arc;
use std::time::Duration;

use kbot_core::config::{FeedConfig, ReconnectConfig};
use kbot_core::error::KbotError;
use kbot_core::ledger::TradeLedger;
use kbot_core::types::{ConnectionState, Tick};
use kbot_core::ws::{Connector, LinkHandle, LinkWriter, WsFrame, WsLink};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::kraken::{self, FeedEvent};
use crate::reconnect::ReconnectPolicy;

/// Settings for one feed session.
#[derive(Debug, Clone)]
pub struct FeedSessionConfig {
    pub url: String,
    pub pair: String,
    /// Keepalive ping interval. Two silent intervals mark the connection degraded.
    pub ping_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl From<&FeedConfig> for FeedSessionConfig {
    fn from(cfg: &FeedConfig) -> Self {
        Self {
            url: cfg.url.clone(),
            pair: cfg.pair.clone(),
            ping_interval: cfg.ping_interval(),
            reconnect: cfg.reconnect.clone(),
        }
    }
}

/// Why a single connection ended.
enum ConnectionEnd {
    /// Shutdown was requested; do not reconnect.
    Shutdown,
    /// The connection failed or was closed; reconnect after a delay.
    Lost(KbotError),
}

/// Owner of the feed connection state machine.
pub struct FeedSession<C> {
    config: FeedSessionConfig,
    connector: C,
    ledger: Arc<TradeLedger>,
    tick_tx: mpsc::Sender<Tick>,
    state_tx: watch::Sender<ConnectionState>,
    policy: ReconnectPolicy,
}

impl<C: Connector + 'static> FeedSession<C> {
    /// Create a session. Nothing is opened until [`start`](Self::start) or
    /// [`run`](Self::run).
    pub fn new(config: FeedSessionConfig, connector: C, ledger: Arc<TradeLedger>, tick_tx: mpsc::Sender<Tick>) -> Self {
        let policy = ReconnectPolicy::new(config.reconnect.clone());
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { config, connector, ledger, tick_tx, state_tx, policy }
    }

    /// Observe state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Spawn the session on the tokio runtime.
    pub fn start(self) -> FeedHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state_rx = self.subscribe_state();
        let task = tokio::spawn(self.run(shutdown_rx));
        FeedHandle { shutdown_tx, state_rx, task: Some(task) }
    }

    /// Run until shutdown is signalled (or the reconnect budget is spent).
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            info!("[feed] connecting to {}", self.config.url);

            let connected = tokio::select! {
                res = self.connector.connect(&self.config.url) => Some(res),
                _ = shutdown_rx.changed() => None,
            };

            match connected {
                None => break,
                Some(Ok(link)) => {
                    info!("[feed] connected");
                    match self.run_connection(link, &mut shutdown_rx).await {
                        ConnectionEnd::Shutdown => break,
                        ConnectionEnd::Lost(e) => warn!("[feed] connection lost: {e}"),
                    }
                }
                Some(Err(e)) => error!("[feed] connection failed: {e}"),
            }

            self.set_state(ConnectionState::Disconnected);

            let Some(delay) = self.policy.next_delay() else {
                error!("[feed] reconnect budget exhausted after {} attempts, giving up", self.policy.attempts());
                break;
            };
            info!("[feed] reconnecting in {delay:?}");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                _ = shutdown_rx.changed() => break,
            }
        }

        self.set_state(ConnectionState::Closing);
        info!("[feed] session terminated");
    }

    /// Drive one connection from subscribe to teardown.
    async fn run_connection(&mut self, link: WsLink, shutdown_rx: &mut watch::Receiver<bool>) -> ConnectionEnd {
        let WsLink { sink, mut stream } = link;
        let mut writer = LinkWriter::spawn(sink, "feed".into());
        let handle = writer.handle();
        let mut keepalive: Option<Keepalive> = None;

        self.set_state(ConnectionState::Subscribing);
        let sub_msg = kraken::subscribe_message(&self.config.pair);
        info!("[feed] subscription message: {sub_msg}");

        let end = match handle.send_text(sub_msg).await {
            Err(e) => ConnectionEnd::Lost(e),
            Ok(()) => {
                let stale_after = self.config.ping_interval * 2;
                let mut last_activity = Instant::now();
                let mut liveness =
                    tokio::time::interval_at(Instant::now() + self.config.ping_interval, self.config.ping_interval);

                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            info!("[feed] shutdown signal received");
                            break ConnectionEnd::Shutdown;
                        }

                        _ = writer.closed() => {
                            break ConnectionEnd::Lost(KbotError::Transport("writer closed".into()));
                        }

                        frame = stream.next_frame() => {
                            let frame = match frame {
                                Some(Ok(frame)) => frame,
                                Some(Err(e)) => break ConnectionEnd::Lost(e),
                                None => break ConnectionEnd::Lost(KbotError::Transport("stream ended".into())),
                            };
                            last_activity = Instant::now();
                            if self.current_state() == ConnectionState::Degraded {
                                info!("[feed] activity resumed");
                                self.set_state(ConnectionState::Subscribed);
                            }

                            // Writes inside the handler can stall on a dead peer.
                            let handled = tokio::select! {
                                res = self.handle_frame(frame, &handle, &mut keepalive) => res,
                                _ = shutdown_rx.changed() => {
                                    info!("[feed] shutdown signal received");
                                    break ConnectionEnd::Shutdown;
                                }
                            };
                            match handled {
                                Err(e) if e.is_connection_fatal() => break ConnectionEnd::Lost(e),
                                Err(e) => warn!("[feed] dropping message: {e}"),
                                Ok(()) => {}
                            }
                        }

                        _ = liveness.tick() => {
                            if self.current_state() == ConnectionState::Subscribed
                                && last_activity.elapsed() >= stale_after
                            {
                                warn!("[feed] no keepalive activity for {:?}", last_activity.elapsed());
                                self.set_state(ConnectionState::Degraded);
                            }
                        }
                    }
                }
            }
        };

        if matches!(end, ConnectionEnd::Shutdown) {
            self.set_state(ConnectionState::Closing);
        }

        // Keepalive first, then the transport: the ping loop must never
        // outlive the handle it writes through.
        if let Some(k) = keepalive.take() {
            k.stop().await;
        }
        drop(handle);
        writer.shutdown().await;

        end
    }

    async fn handle_frame(
        &mut self,
        frame: WsFrame,
        handle: &LinkHandle,
        keepalive: &mut Option<Keepalive>,
    ) -> Result<(), KbotError> {
        match frame {
            WsFrame::Text(text) => self.handle_text(&text, handle, keepalive).await,
            WsFrame::Ping(data) => handle.send(WsFrame::Pong(data)).await,
            WsFrame::Close(reason) => {
                Err(KbotError::Transport(format!("closed by peer: {}", reason.as_deref().unwrap_or("no reason"))))
            }
            WsFrame::Binary(data) => {
                info!("[feed] unhandled binary message ({} bytes)", data.len());
                Ok(())
            }
            WsFrame::Pong(_) => Ok(()),
        }
    }

    async fn handle_text(
        &mut self,
        text: &str,
        handle: &LinkHandle,
        keepalive: &mut Option<Keepalive>,
    ) -> Result<(), KbotError> {
        let event = kraken::decode(text)?;
        match event {
            FeedEvent::TradeBatch { pair, ticks, skipped } => {
                if pair != self.config.pair || !self.current_state().is_streaming() {
                    info!("[feed] unhandled trade batch for {pair} in state {}: {text}", self.current_state());
                    return Ok(());
                }
                if skipped > 0 {
                    warn!("[feed] skipped {skipped} malformed trade entries: {text}");
                }
                for tick in ticks {
                    self.ledger.append(tick);
                    debug!("[feed] received new trade data: {tick}");
                    if self.tick_tx.send(tick).await.is_err() {
                        warn!("[feed] strategy channel closed, tick kept in ledger only");
                    }
                }
            }
            FeedEvent::Heartbeat => {
                debug!("[feed] received heartbeat");
                handle.send_text(kraken::pong_message()).await?;
                debug!("[feed] pong sent");
            }
            FeedEvent::Pong { reqid } => debug!("[feed] received pong reqid={reqid:?}"),
            FeedEvent::SystemStatus { status, version } => {
                info!("[feed] system status: {status} (version {})", version.as_deref().unwrap_or("?"));
            }
            FeedEvent::SubscriptionAck { pair, channel_id } => {
                if pair != self.config.pair || self.current_state() != ConnectionState::Subscribing {
                    info!("[feed] ignoring subscription ack for {pair} in state {}", self.current_state());
                    return Ok(());
                }
                info!("[feed] subscribed to {pair} trade data (channel {channel_id:?})");
                self.set_state(ConnectionState::Subscribed);
                self.policy.reset();
                *keepalive = Some(Keepalive::spawn(handle.clone(), self.config.ping_interval));
            }
            FeedEvent::SubscriptionError { pair, message } => {
                error!("[feed] subscription error for {}: {message}", pair.as_deref().unwrap_or("?"));
                return Err(KbotError::Subscription(message));
            }
            FeedEvent::ProtocolError { message } => {
                error!("[feed] protocol error: {message}");
                return Err(KbotError::Transport(format!("protocol error: {message}")));
            }
            FeedEvent::Unrecognized(raw) => info!("[feed] unhandled message: {raw}"),
        }
        Ok(())
    }

    fn current_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            info!("[feed] state {state} -> {next}");
            *state = next;
            true
        });
    }
}

// ---------------------------------------------------------------------------
// Keepalive loop
// ---------------------------------------------------------------------------

const KEEPALIVE_STOP_GRACE: Duration = Duration::from_secs(2);

/// Per-connection ping loop. Halts itself once the connection is no longer
/// open; a fresh one is spawned for every new subscription.
struct Keepalive {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Keepalive {
    fn spawn(link: LinkHandle, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut reqid = 0u64;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        reqid += 1;
                        let sent = tokio::select! {
                            res = link.send_text(kraken::ping_message(reqid)) => res,
                            _ = &mut stop_rx => break,
                        };
                        match sent {
                            Ok(()) => debug!("[feed] ping {reqid} sent"),
                            Err(KbotError::NotOpen) => {
                                error!("[feed] connection is closed, stopping ping loop");
                                break;
                            }
                            Err(e) => {
                                error!("[feed] error sending ping: {e}");
                                break;
                            }
                        }
                    }
                }
            }
        });
        Self { stop_tx, task }
    }

    /// Signal the loop and wait for it, aborting after [`KEEPALIVE_STOP_GRACE`].
    async fn stop(self) {
        let Self { stop_tx, task } = self;
        let _ = stop_tx.send(());
        let abort = task.abort_handle();
        if tokio::time::timeout(KEEPALIVE_STOP_GRACE, task).await.is_err() {
            warn!("[feed] ping loop did not stop within {KEEPALIVE_STOP_GRACE:?}, aborting");
            abort.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// FeedHandle
// ---------------------------------------------------------------------------

/// Handle to a running [`FeedSession`] task.
pub struct FeedHandle {
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<ConnectionState>,
    /// `None` once the task has been awaited to completion.
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A receiver for state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Request shutdown and wait for the session task to exit. The keepalive
    /// loop is stopped and the transport closed before this returns.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        self.stopped().await;
    }

    /// Wait until the session task exits, either after [`shutdown`](Self::shutdown)
    /// or because the reconnect budget ran out. Cancel-safe.
    pub async fn stopped(&mut self) {
        if let Some(task) = self.task.as_mut() {
            if let Err(e) = task.await {
                error!("[feed] session task failed: {e}");
            }
            self.task = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use kbot_core::ws::{FrameSink, FrameStream};

    use super::*;

    const PAIR: &str = "XBT/USD";

    // -- in-memory transport ------------------------------------------------

    struct MockSink(mpsc::UnboundedSender<WsFrame>);

    #[async_trait]
    impl FrameSink for MockSink {
        async fn send(&mut self, frame: WsFrame) -> Result<(), KbotError> {
            self.0.send(frame).map_err(|_| KbotError::Transport("peer gone".into()))
        }

        async fn close(&mut self) -> Result<(), KbotError> {
            Ok(())
        }
    }

    struct MockStream(mpsc::UnboundedReceiver<Result<WsFrame, KbotError>>);

    #[async_trait]
    impl FrameStream for MockStream {
        async fn next_frame(&mut self) -> Option<Result<WsFrame, KbotError>> {
            self.0.recv().await
        }
    }

    /// Venue side of one scripted connection. Dropping it closes the stream.
    struct Server {
        to_client: mpsc::UnboundedSender<Result<WsFrame, KbotError>>,
        from_client: mpsc::UnboundedReceiver<WsFrame>,
    }

    impl Server {
        fn send(&self, text: &str) {
            self.to_client.send(Ok(WsFrame::Text(text.to_owned()))).unwrap();
        }

        /// Next text frame from the client, skipping keepalive pings.
        async fn next_non_ping(&mut self) -> String {
            loop {
                match self.from_client.recv().await.expect("client hung up") {
                    WsFrame::Text(t) if t.contains("\"ping\"") => continue,
                    WsFrame::Text(t) => return t,
                    _ => continue,
                }
            }
        }

        async fn accept_subscription(&mut self) {
            let sub = self.next_non_ping().await;
            assert!(sub.contains("\"subscribe\""), "expected subscribe, got {sub}");
            assert!(sub.contains(PAIR));
            self.send(&format!(
                r#"{{"channelID":1,"channelName":"trade","event":"subscriptionStatus","pair":"{PAIR}","status":"subscribed","subscription":{{"name":"trade"}}}}"#
            ));
        }
    }

    #[derive(Default)]
    struct MockConnector {
        links: Mutex<VecDeque<WsLink>>,
        attempts: Arc<AtomicUsize>,
    }

    impl MockConnector {
        fn with_servers(n: usize) -> (Self, Vec<Server>) {
            let connector = Self::default();
            let mut servers = Vec::new();
            for _ in 0..n {
                let (to_client, client_rx) = mpsc::unbounded_channel();
                let (client_tx, from_client) = mpsc::unbounded_channel();
                connector
                    .links
                    .lock()
                    .unwrap()
                    .push_back(WsLink { sink: Box::new(MockSink(client_tx)), stream: Box::new(MockStream(client_rx)) });
                servers.push(Server { to_client, from_client });
            }
            (connector, servers)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, _url: &str) -> Result<WsLink, KbotError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.links.lock().unwrap().pop_front().ok_or_else(|| KbotError::Transport("connection refused".into()))
        }
    }

    fn config() -> FeedSessionConfig {
        FeedSessionConfig {
            url: "wss://example.invalid".into(),
            pair: PAIR.into(),
            ping_interval: Duration::from_secs(30),
            reconnect: ReconnectConfig::Fixed { delay_secs: 5 },
        }
    }

    fn trade_batch(entries: &[(f64, f64)]) -> String {
        let body: Vec<String> =
            entries.iter().map(|(price, time)| format!(r#"["{price}","0.5","{time}","b","m",""]"#)).collect();
        format!(r#"[7,[{}],"trade","{PAIR}"]"#, body.join(","))
    }

    async fn wait_for(rx: &mut watch::Receiver<ConnectionState>, want: ConnectionState) {
        rx.wait_for(|s| *s == want).await.expect("session dropped");
    }

    struct Harness {
        handle: FeedHandle,
        states: watch::Receiver<ConnectionState>,
        ledger: Arc<TradeLedger>,
        ticks: mpsc::Receiver<Tick>,
        attempts: Arc<AtomicUsize>,
    }

    fn start(connector: MockConnector) -> Harness {
        start_with(connector, config())
    }

    fn start_with(connector: MockConnector, config: FeedSessionConfig) -> Harness {
        let ledger = Arc::new(TradeLedger::new());
        let (tick_tx, ticks) = mpsc::channel(64);
        let attempts = Arc::clone(&connector.attempts);
        let session = FeedSession::new(config, connector, Arc::clone(&ledger), tick_tx);
        let states = session.subscribe_state();
        let handle = session.start();
        Harness { handle, states, ledger, ticks, attempts }
    }

    // -- tests ---------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn subscribes_then_dispatches_trades_to_ledger_and_strategy() {
        let (connector, mut servers) = MockConnector::with_servers(1);
        let mut h = start(connector);
        let server = &mut servers[0];

        server.accept_subscription().await;
        wait_for(&mut h.states, ConnectionState::Subscribed).await;

        server.send(&trade_batch(&[(100.0, 1.0), (101.0, 2.0)]));
        assert_eq!(h.ticks.recv().await.unwrap().price, 100.0);
        assert_eq!(h.ticks.recv().await.unwrap().price, 101.0);
        assert_eq!(h.ledger.len(), 2);

        h.handle.shutdown().await;
        assert_eq!(*h.states.borrow(), ConnectionState::Closing);
    }

    #[tokio::test(start_paused = true)]
    async fn trades_before_ack_or_for_other_pairs_are_ignored() {
        let (connector, mut servers) = MockConnector::with_servers(1);
        let mut h = start(connector);
        let server = &mut servers[0];

        let sub = server.next_non_ping().await;
        assert!(sub.contains("subscribe"));
        server.send(&trade_batch(&[(99.0, 1.0)]));
        server.send(&format!(
            r#"{{"channelID":1,"channelName":"trade","event":"subscriptionStatus","pair":"{PAIR}","status":"subscribed","subscription":{{"name":"trade"}}}}"#
        ));
        wait_for(&mut h.states, ConnectionState::Subscribed).await;
        server.send(r#"[7,[["5.0","1.0","1.0"]],"trade","ETH/USD"]"#);
        server.send(&trade_batch(&[(100.0, 3.0)]));

        assert_eq!(h.ticks.recv().await.unwrap().price, 100.0);
        assert_eq!(h.ledger.len(), 1);
        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_gets_exactly_one_pong_without_state_change() {
        let (connector, mut servers) = MockConnector::with_servers(1);
        let mut h = start(connector);
        let server = &mut servers[0];

        server.accept_subscription().await;
        wait_for(&mut h.states, ConnectionState::Subscribed).await;

        server.send(r#"{"event":"heartbeat"}"#);
        assert_eq!(server.next_non_ping().await, r#"{"event":"pong"}"#);

        // Round-trip another message so the session has processed everything.
        server.send(r#"{"event":"systemStatus","status":"online","version":"1.0.0"}"#);
        server.send(&trade_batch(&[(1.0, 1.0)]));
        h.ticks.recv().await.unwrap();

        let mut extra_pongs = 0;
        while let Ok(frame) = server.from_client.try_recv() {
            if frame == WsFrame::Text(r#"{"event":"pong"}"#.into()) {
                extra_pongs += 1;
            }
        }
        assert_eq!(extra_pongs, 0);
        assert_eq!(*h.states.borrow(), ConnectionState::Subscribed);
        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_close_without_losing_or_replaying_ticks() {
        let (connector, servers) = MockConnector::with_servers(2);
        let mut h = start(connector);
        let mut servers = servers.into_iter();
        let mut first = servers.next().unwrap();
        let mut second = servers.next().unwrap();

        first.accept_subscription().await;
        wait_for(&mut h.states, ConnectionState::Subscribed).await;
        first.send(&trade_batch(&[(100.0, 1.0), (101.0, 2.0)]));
        h.ticks.recv().await.unwrap();
        h.ticks.recv().await.unwrap();

        let closed_at = Instant::now();
        drop(first);
        wait_for(&mut h.states, ConnectionState::Disconnected).await;

        second.accept_subscription().await;
        assert!(closed_at.elapsed() >= Duration::from_secs(5), "reconnected after {:?}", closed_at.elapsed());
        wait_for(&mut h.states, ConnectionState::Subscribed).await;
        assert_eq!(h.attempts.load(Ordering::SeqCst), 2);

        second.send(&trade_batch(&[(102.0, 3.0)]));
        assert_eq!(h.ticks.recv().await.unwrap().price, 102.0);

        let prices: Vec<f64> = h.ledger.snapshot().iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![100.0, 101.0, 102.0]);
        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_error_triggers_delayed_reconnect() {
        let (connector, mut servers) = MockConnector::with_servers(2);
        let mut h = start(connector);

        let sub = servers[0].next_non_ping().await;
        assert!(sub.contains("subscribe"));
        let rejected_at = Instant::now();
        servers[0].send(
            r#"{"errorMessage":"Currency pair not supported","event":"subscriptionStatus","pair":"XBT/USD","status":"error","subscription":{"name":"trade"}}"#,
        );
        wait_for(&mut h.states, ConnectionState::Disconnected).await;

        servers[1].accept_subscription().await;
        assert!(rejected_at.elapsed() >= Duration::from_secs(5));
        wait_for(&mut h.states, ConnectionState::Subscribed).await;
        assert_eq!(h.attempts.load(Ordering::SeqCst), 2);
        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connects_retry_with_fixed_delay() {
        let (connector, _) = MockConnector::with_servers(0);
        let attempts = Arc::clone(&connector.attempts);
        let h = start(connector);

        tokio::time::sleep(Duration::from_secs(21)).await;
        // t=0, 5, 10, 15, 20
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_connection_degrades_and_recovers() {
        let (connector, mut servers) = MockConnector::with_servers(1);
        let mut h = start(connector);
        let server = &mut servers[0];

        server.accept_subscription().await;
        wait_for(&mut h.states, ConnectionState::Subscribed).await;

        let quiet_since = Instant::now();
        wait_for(&mut h.states, ConnectionState::Degraded).await;
        assert!(quiet_since.elapsed() >= Duration::from_secs(60));

        server.send(r#"{"event":"heartbeat"}"#);
        wait_for(&mut h.states, ConnectionState::Subscribed).await;
        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_pings_while_subscribed() {
        let (connector, mut servers) = MockConnector::with_servers(1);
        let mut h = start(connector);
        let server = &mut servers[0];

        server.accept_subscription().await;
        wait_for(&mut h.states, ConnectionState::Subscribed).await;

        let mut reqids = Vec::new();
        while reqids.len() < 3 {
            if let Some(WsFrame::Text(t)) = server.from_client.recv().await {
                if t.contains("\"ping\"") {
                    let v: serde_json::Value = serde_json::from_str(&t).unwrap();
                    reqids.push(v["reqid"].as_u64().unwrap());
                }
            }
        }
        assert_eq!(reqids, vec![1, 2, 3]);
        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_transport_and_stops_reconnecting() {
        let (connector, mut servers) = MockConnector::with_servers(2);
        let mut h = start(connector);

        servers[0].accept_subscription().await;
        wait_for(&mut h.states, ConnectionState::Subscribed).await;

        h.handle.shutdown().await;
        assert_eq!(*h.states.borrow(), ConnectionState::Closing);

        // Every client-side sender is gone: the writer and the ping loop both exited.
        while servers[0].from_client.recv().await.is_some() {}

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_error_drops_connection() {
        let (connector, mut servers) = MockConnector::with_servers(2);
        let mut h = start(connector);

        servers[0].accept_subscription().await;
        wait_for(&mut h.states, ConnectionState::Subscribed).await;
        servers[0].send(r#"{"event":"error","errorMessage":"Malformed request"}"#);
        wait_for(&mut h.states, ConnectionState::Disconnected).await;

        servers[1].accept_subscription().await;
        wait_for(&mut h.states, ConnectionState::Subscribed).await;
        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_frames_do_not_break_the_session() {
        let (connector, mut servers) = MockConnector::with_servers(1);
        let mut h = start(connector);
        let server = &mut servers[0];

        server.accept_subscription().await;
        wait_for(&mut h.states, ConnectionState::Subscribed).await;
        server.send("garbage{");
        server.send(r#"{"event":"brandNewThing"}"#);
        server.send(&trade_batch(&[(42.0, 1.0)]));

        assert_eq!(h.ticks.recv().await.unwrap().price, 42.0);
        assert_eq!(*h.states.borrow(), ConnectionState::Subscribed);
        assert_eq!(h.attempts.load(Ordering::SeqCst), 1);
        h.handle.shutdown().await;
    }

    /// Accepts nothing: every write hangs, like a peer with a full receive window.
    struct StalledSink;

    #[async_trait]
    impl FrameSink for StalledSink {
        async fn send(&mut self, _frame: WsFrame) -> Result<(), KbotError> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<(), KbotError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_completes_when_writes_stall() {
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let connector = MockConnector::default();
        connector
            .links
            .lock()
            .unwrap()
            .push_back(WsLink { sink: Box::new(StalledSink), stream: Box::new(MockStream(client_rx)) });
        let mut h = start(connector);

        to_client
            .send(Ok(WsFrame::Text(format!(
                r#"{{"channelID":1,"channelName":"trade","event":"subscriptionStatus","pair":"{PAIR}","status":"subscribed","subscription":{{"name":"trade"}}}}"#
            ))))
            .unwrap();
        wait_for(&mut h.states, ConnectionState::Subscribed).await;

        // Enough ping intervals to fill the outbound queue behind the stuck write.
        tokio::time::sleep(Duration::from_secs(70 * 30)).await;
        // A heartbeat whose pong can no longer be queued.
        to_client.send(Ok(WsFrame::Text(r#"{"event":"heartbeat"}"#.into()))).unwrap();
        tokio::task::yield_now().await;

        let done = tokio::time::timeout(Duration::from_secs(60), h.handle.shutdown()).await;
        assert!(done.is_ok(), "shutdown blocked on a stalled writer");
        assert_eq!(*h.states.borrow(), ConnectionState::Closing);
    }

    /// Records frames until `fail_after` writes, then reports a broken pipe.
    struct FailingSink {
        sent: mpsc::UnboundedSender<WsFrame>,
        fail_after: usize,
    }

    #[async_trait]
    impl FrameSink for FailingSink {
        async fn send(&mut self, frame: WsFrame) -> Result<(), KbotError> {
            if self.fail_after == 0 {
                return Err(KbotError::Transport("broken pipe".into()));
            }
            self.fail_after -= 1;
            self.sent.send(frame).map_err(|_| KbotError::Transport("peer gone".into()))
        }

        async fn close(&mut self) -> Result<(), KbotError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ping_loop_halts_once_link_is_not_open() {
        let (sent_tx, mut sent) = mpsc::unbounded_channel();
        let writer = LinkWriter::spawn(Box::new(FailingSink { sent: sent_tx, fail_after: 2 }), "test".into());
        let handle = writer.handle();
        let keepalive = Keepalive::spawn(handle.clone(), Duration::from_secs(30));

        // Pings at t=0 and t=30 go out, the one at t=60 kills the writer,
        // the one at t=90 finds the link closed.
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert!(!handle.is_open());
        assert!(keepalive.task.is_finished(), "ping loop kept running on a closed link");

        tokio::time::sleep(Duration::from_secs(300)).await;
        let mut pings = 0;
        while let Ok(frame) = sent.try_recv() {
            assert!(matches!(frame, WsFrame::Text(t) if t.contains("\"ping\"")));
            pings += 1;
        }
        assert_eq!(pings, 2);

        keepalive.stop().await;
        drop(handle);
        writer.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn handle_reports_session_end_when_retries_run_out() {
        let (connector, _) = MockConnector::with_servers(0);
        let config = FeedSessionConfig {
            reconnect: ReconnectConfig::Exponential { initial_secs: 1, max_secs: 4, max_retries: Some(2) },
            ..config()
        };
        let mut h = start_with(connector, config);

        let ended = tokio::time::timeout(Duration::from_secs(60), h.handle.stopped()).await;
        assert!(ended.is_ok(), "session kept running after its reconnect budget");
        assert_eq!(*h.states.borrow(), ConnectionState::Closing);
        h.handle.shutdown().await;
    }
}
