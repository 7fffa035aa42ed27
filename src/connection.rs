//! Connection lifecycle: open, send, receive, close.
//!
//! A [`ConnectionManager`] owns at most one live transport at a time. The
//! outbound half is handed to the writer task, the inbound half is taken
//! once by the message router. Connectivity is published on a `watch`
//! channel so background loops can select on [`ConnectionManager::disconnected`].
//!
//! The manager is reusable: after [`close`](ConnectionManager::close) a new
//! [`open`](ConnectionManager::open) starts a fresh connection.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{ChannelError, Result};
use crate::protocol::Message;
use crate::transport::{Connector, FrameStream};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// How long `close` waits for the writer to flush and close the sink.
const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Resources of the current connection.
#[derive(Default)]
struct Link {
    url: Option<String>,
    writer: Option<WriterHandle>,
    writer_task: Option<JoinHandle<Result<()>>>,
    frames: Option<FrameStream>,
}

/// Owns the transport connection.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    writer_config: WriterConfig,
    /// Serializes concurrent `open` calls.
    opening: tokio::sync::Mutex<()>,
    link: Mutex<Link>,
    connected: watch::Sender<bool>,
}

impl ConnectionManager {
    /// Create a disconnected manager.
    pub fn new(connector: Arc<dyn Connector>, writer_config: WriterConfig) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            connector,
            writer_config,
            opening: tokio::sync::Mutex::new(()),
            link: Mutex::new(Link::default()),
            connected,
        }
    }

    /// Establish the transport.
    ///
    /// A no-op returning `Ok` if already connected.
    pub async fn open(&self, url: &str) -> Result<()> {
        let _opening = self.opening.lock().await;
        if self.is_connected() {
            tracing::debug!(url, "Already connected");
            return Ok(());
        }

        let transport = self.connector.connect(url).await?;
        let (writer, writer_task) = spawn_writer_task(transport.sink, self.writer_config.clone());

        *self.link.lock() = Link {
            url: Some(url.to_string()),
            writer: Some(writer),
            writer_task: Some(writer_task),
            frames: Some(transport.stream),
        };
        self.connected.send_replace(true);

        tracing::info!(url, "Connected");
        Ok(())
    }

    /// Encode and queue a message.
    ///
    /// Without a live connection this does nothing and returns `Ok`.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let writer = self.link.lock().writer.clone();
        let writer = match writer {
            Some(writer) if self.is_connected() => writer,
            _ => {
                tracing::trace!(name = %message.message_name, "Not connected, dropping message");
                return Ok(());
            }
        };

        writer
            .send(OutboundFrame::from_message(message))
            .await
            .map_err(|_| {
                ChannelError::Send(format!("writer stopped while sending {}", message.message_name))
            })
    }

    /// Take the inbound frame stream of the current connection.
    ///
    /// Returns `None` if disconnected or already taken.
    pub fn take_frames(&self) -> Option<FrameStream> {
        self.link.lock().frames.take()
    }

    /// Tear down the current connection.
    ///
    /// Idempotent and safe to call concurrently; only the first caller
    /// joins the writer.
    pub async fn close(&self) {
        let link = std::mem::take(&mut *self.link.lock());
        let was_connected = self.connected.send_replace(false);

        let Link {
            url,
            writer,
            writer_task,
            frames,
        } = link;
        drop(frames);
        // Dropping the last handle makes the writer close the sink.
        drop(writer);

        if let Some(mut task) = writer_task {
            match tokio::time::timeout(WRITER_CLOSE_TIMEOUT, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => tracing::debug!(error = %e, "Writer ended with error"),
                Ok(Err(e)) => tracing::debug!(error = %e, "Writer task failed"),
                Err(_) => {
                    tracing::warn!("Writer did not stop in time, aborting");
                    task.abort();
                }
            }
        }

        if was_connected {
            tracing::info!(url = url.as_deref().unwrap_or_default(), "Disconnected");
        }
    }

    /// Whether a connection is live.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Resolve once the connection is not live.
    pub async fn disconnected(&self) {
        let mut rx = self.connected.subscribe();
        // The sender lives as long as `self`, so this only ends on `false`.
        let _ = rx.wait_for(|connected| !*connected).await;
    }

    /// URL of the live connection.
    pub fn url(&self) -> Option<String> {
        self.link.lock().url.clone()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connected", &self.is_connected())
            .field("url", &self.url())
            .finish()
    }
}
