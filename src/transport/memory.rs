//! In-process transport.
//!
//! [`MemoryConnector::pair`] returns a connector and the [`MemoryListener`]
//! that receives its connections. Each accepted [`MemoryPeer`] is the server
//! end of one connection: it reads what the client sent and can push frames
//! back or close the connection.
//!
//! # Example
//!
//! ```ignore
//! use wbchannel_client::transport::{Connector, MemoryConnector};
//!
//! let (connector, mut listener) = MemoryConnector::pair();
//! let transport = connector.connect("memory://server").await?;
//! let mut peer = listener.accept().await.unwrap();
//! ```

use futures::channel::mpsc as frames;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::{BoxFuture, Connector, Transport};
use crate::error::{ChannelError, Result};
use crate::protocol::{decode, encode, Message};

/// Connector whose connections land on a [`MemoryListener`].
#[derive(Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<MemoryPeer>,
}

/// Accepts connections made through the paired [`MemoryConnector`].
///
/// Once dropped, further connection attempts fail.
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Server end of one in-process connection.
pub struct MemoryPeer {
    url: String,
    from_client: frames::UnboundedReceiver<String>,
    to_client: Option<frames::UnboundedSender<Result<String>>>,
}

impl MemoryConnector {
    /// Create a connector and its listener.
    pub fn pair() -> (MemoryConnector, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MemoryConnector { incoming: tx },
            MemoryListener { incoming: rx },
        )
    }
}

impl Connector for MemoryConnector {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Transport>> {
        Box::pin(async move {
            let (client_tx, from_client) = frames::unbounded::<String>();
            let (to_client, client_rx) = frames::unbounded::<Result<String>>();

            let peer = MemoryPeer {
                url: url.to_string(),
                from_client,
                to_client: Some(to_client),
            };

            self.incoming.send(peer).map_err(|_| ChannelError::Connect {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            })?;

            let sink = client_tx.sink_map_err(|e| ChannelError::Send(e.to_string()));
            Ok(Transport::new(Box::pin(sink), Box::pin(client_rx)))
        })
    }
}

impl MemoryListener {
    /// Wait for the next connection.
    ///
    /// Returns `None` once every connector has been dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }

    /// Take a pending connection without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.try_recv().ok()
    }
}

impl MemoryPeer {
    /// URL the client connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next raw frame from the client, `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.next().await
    }

    /// Next decodable message from the client.
    ///
    /// Frames that fail to decode are skipped.
    pub async fn recv_message(&mut self) -> Option<Message> {
        loop {
            let frame = self.recv().await?;
            match decode(&frame) {
                Ok(message) => return Some(message),
                Err(e) => tracing::warn!(error = %e, "Peer skipped undecodable frame"),
            }
        }
    }

    /// Push a raw frame to the client. Returns `false` if the client is gone.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        match &self.to_client {
            Some(tx) => tx.unbounded_send(Ok(frame.into())).is_ok(),
            None => false,
        }
    }

    /// Encode and push a message to the client.
    pub fn send_message(&self, message: &Message) -> bool {
        self.send(encode(message))
    }

    /// Push a transport error to the client's stream.
    pub fn fail(&self, error: ChannelError) -> bool {
        match &self.to_client {
            Some(tx) => tx.unbounded_send(Err(error)).is_ok(),
            None => false,
        }
    }

    /// End the client's inbound stream.
    pub fn close(&mut self) {
        self.to_client = None;
    }

    /// Whether this end has been closed.
    pub fn is_closed(&self) -> bool {
        self.to_client.is_none()
    }
}
