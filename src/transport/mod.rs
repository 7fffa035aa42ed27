//! Transport module - how raw text frames reach the server.
//!
//! A [`Connector`] opens a [`Transport`]: a sink for outbound frames and a
//! stream of inbound frames. Two implementations ship with the crate:
//! - [`WebSocketConnector`] - `tokio-tungstenite` over `ws://` / `wss://`
//! - [`MemoryConnector`] - in-process channel pair, paired with a
//!   [`MemoryListener`] that plays the server

use std::future::Future;
use std::pin::Pin;

use futures::{Sink, Stream};

use crate::error::Result;

mod memory;
mod websocket;

pub use memory::{MemoryConnector, MemoryListener, MemoryPeer};
pub use websocket::WebSocketConnector;

/// Boxed future returned by connectors.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound half: accepts one text frame per item.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = crate::error::ChannelError> + Send>>;

/// Inbound half: yields one text frame per item, ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An open, split transport.
pub struct Transport {
    /// Outbound frames.
    pub sink: FrameSink,
    /// Inbound frames.
    pub stream: FrameStream,
}

impl Transport {
    /// Bundle both halves.
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens transports to an endpoint.
pub trait Connector: Send + Sync + 'static {
    /// Connect to `url`.
    ///
    /// Failures are reported as [`ChannelError::Connect`](crate::error::ChannelError::Connect).
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Transport>>;
}
