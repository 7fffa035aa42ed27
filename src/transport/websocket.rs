//! WebSocket transport over `tokio-tungstenite`.
//!
//! Text and UTF-8 binary messages become frames; ping/pong and close
//! control messages are handled by tungstenite and never surface.
//!
//! # Example
//!
//! ```ignore
//! use wbchannel_client::transport::{Connector, WebSocketConnector};
//!
//! let transport = WebSocketConnector::new()
//!     .connect("wss://www.srdcloud.cn/websocket/peerAppgw")
//!     .await?;
//! ```

use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};

use super::{BoxFuture, Connector, Transport};
use crate::error::{ChannelError, Result};

/// Connects with `tokio_tungstenite::connect_async`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Transport>> {
        Box::pin(async move {
            let (ws, _response) = connect_async(url).await.map_err(|e| ChannelError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

            let (ws_tx, ws_rx) = ws.split();

            let sink = ws_tx
                .with(|text: String| future::ready(Ok::<_, tungstenite::Error>(WsMessage::text(text))))
                .sink_map_err(ChannelError::from);

            let stream = ws_rx.filter_map(|item| future::ready(inbound_frame(item)));

            Ok(Transport::new(Box::pin(sink), Box::pin(stream)))
        })
    }
}

/// Map one tungstenite read result to a frame, dropping control messages.
fn inbound_frame(item: std::result::Result<WsMessage, tungstenite::Error>) -> Option<Result<String>> {
    match item {
        Ok(WsMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(Ok(text)),
            Err(_) => {
                tracing::warn!(len = bytes.len(), "Dropping non-UTF-8 binary frame");
                None
            }
        },
        Ok(_) => None,
        // The peer closing without a close handshake is still just a close.
        Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => None,
        Err(e) => Some(Err(ChannelError::from(e))),
    }
}
