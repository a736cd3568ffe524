//! Transport abstraction over a single WebSocket connection.
//!
//! The feed session only talks to [`Connector`], [`FrameSink`] and
//! [`FrameStream`], so tests can substitute an in-memory transport. The
//! production implementation, [`TungsteniteConnector`], opens a TLS
//! connection with `tokio-tungstenite` and splits it into halves.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::KbotError;

type TungsteniteStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport-level frame, independent of the WebSocket library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// Close frame, with the peer's reason when one was given.
    Close(Option<String>),
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: WsFrame) -> Result<(), KbotError>;
    /// Send a close frame and flush.
    async fn close(&mut self) -> Result<(), KbotError>;
}

/// Read half of a connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Next inbound frame; `None` once the stream has ended.
    async fn next_frame(&mut self) -> Option<Result<WsFrame, KbotError>>;
}

/// An established connection, already split into halves.
pub struct WsLink {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

/// Opens connections to a WebSocket endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<WsLink, KbotError>;
}

// ---------------------------------------------------------------------------
// tokio-tungstenite implementation
// ---------------------------------------------------------------------------

/// Production connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector {
    /// Extra HTTP headers for the handshake.
    pub extra_headers: HashMap<String, String>,
}

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<WsLink, KbotError> {
        let mut request =
            url.into_client_request().map_err(|e| KbotError::Transport(format!("bad request for {url}: {e}")))?;

        for (key, value) in &self.extra_headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| KbotError::Config(format!("header name '{key}': {e}")))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| KbotError::Config(format!("header value for '{key}': {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| KbotError::Transport(format!("handshake with {url} failed: {e}")))?;
        debug!("handshake complete, status={}", response.status());

        let (write, read) = stream.split();
        Ok(WsLink { sink: Box::new(TungsteniteSink(write)), stream: Box::new(TungsteniteReader(read)) })
    }
}

struct TungsteniteSink(SplitSink<TungsteniteStream, Message>);

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send(&mut self, frame: WsFrame) -> Result<(), KbotError> {
        let msg = match frame {
            WsFrame::Text(t) => Message::Text(t.into()),
            WsFrame::Binary(b) => Message::Binary(b.into()),
            WsFrame::Ping(p) => Message::Ping(p.into()),
            WsFrame::Pong(p) => Message::Pong(p.into()),
            WsFrame::Close(_) => Message::Close(None),
        };
        self.0.send(msg).await.map_err(|e| KbotError::Transport(format!("send failed: {e}")))
    }

    async fn close(&mut self) -> Result<(), KbotError> {
        self.0.close().await.map_err(|e| KbotError::Transport(format!("close failed: {e}")))
    }
}

struct TungsteniteReader(SplitStream<TungsteniteStream>);

#[async_trait]
impl FrameStream for TungsteniteReader {
    async fn next_frame(&mut self) -> Option<Result<WsFrame, KbotError>> {
        loop {
            let frame = match self.0.next().await? {
                Ok(Message::Text(text)) => WsFrame::Text(text.as_str().to_owned()),
                Ok(Message::Binary(data)) => WsFrame::Binary(data.to_vec()),
                Ok(Message::Ping(data)) => WsFrame::Ping(data.to_vec()),
                Ok(Message::Pong(data)) => WsFrame::Pong(data.to_vec()),
                Ok(Message::Close(frame)) => WsFrame::Close(frame.map(|f| format!("{} {}", f.code, f.reason.as_str()))),
                // Raw frames are never surfaced when reading.
                Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(KbotError::Transport(format!("read failed: {e}")))),
            };
            return Some(Ok(frame));
        }
    }
}
