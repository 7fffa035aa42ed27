//! Message router - demultiplexes inbound frames.
//!
//! For each decoded frame:
//! - `ServerHeartbeat` → reply with `ClientHeartbeatResponse`, forward nothing
//! - `Closed` → close the connection and stop routing
//! - anything else → correlation queue
//!
//! Undecodable frames are logged and skipped. When the frame stream ends or
//! fails, the router closes the connection so every other activity sees
//! the disconnect. On exit the queue sender is dropped, which turns a
//! pending exchange into `Disconnected`.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::connection::ConnectionManager;
use crate::error::ChannelError;
use crate::protocol::{decode, Message, MessageName};
use crate::queue::{CorrelationQueue, QueueSender};
use crate::transport::FrameStream;

/// What the read loop does after a frame.
enum Flow {
    Continue,
    Stop,
}

/// Spawns the routing loop for one connection.
pub struct MessageRouter;

impl MessageRouter {
    /// Start routing `frames`, returning the queue it feeds and the loop's handle.
    pub fn spawn(
        frames: FrameStream,
        conn: Arc<ConnectionManager>,
        exchange_timeout: Duration,
    ) -> (CorrelationQueue, JoinHandle<()>) {
        let (tx, queue) = CorrelationQueue::new(exchange_timeout);
        let handle = tokio::spawn(read_loop(frames, conn, tx));
        (queue, handle)
    }
}

async fn read_loop(mut frames: FrameStream, conn: Arc<ConnectionManager>, queue: QueueSender) {
    loop {
        let frame = tokio::select! {
            _ = conn.disconnected() => {
                tracing::debug!("Router stopping: disconnected");
                break;
            }
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(text)) => {
                if let Flow::Stop = dispatch_frame(&text, &conn, &queue).await {
                    break;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Transport error");
                conn.close().await;
                break;
            }
            None => {
                tracing::info!("Transport closed by peer");
                conn.close().await;
                break;
            }
        }
    }
}

async fn dispatch_frame(text: &str, conn: &ConnectionManager, queue: &QueueSender) -> Flow {
    let message = match decode(text).map_err(ChannelError::from) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, len = text.len(), "Dropping undecodable frame");
            return Flow::Continue;
        }
    };

    match message.message_name {
        MessageName::ServerHeartbeat => {
            tracing::debug!("ServerHeartbeat received");
            if let Err(e) = conn.send(&Message::heartbeat_response()).await {
                tracing::warn!(error = %e, "Failed to answer ServerHeartbeat");
            }
            Flow::Continue
        }
        MessageName::Closed => {
            tracing::info!("Server closed the session");
            conn.close().await;
            Flow::Stop
        }
        _ => {
            tracing::trace!(name = %message.message_name, "Queueing message");
            if queue.send(message).is_err() {
                tracing::debug!("No exchange listening, message dropped");
            }
            Flow::Continue
        }
    }
}
