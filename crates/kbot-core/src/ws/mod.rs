//! WebSocket transport: a connector abstraction with a tungstenite
//! implementation, plus the guarded write handle shared by the dispatch and
//! keepalive loops of one connection.

pub mod client;
pub mod link;

pub use client::{Connector, FrameSink, FrameStream, TungsteniteConnector, WsFrame, WsLink};
pub use link::{LinkHandle, LinkWriter};
