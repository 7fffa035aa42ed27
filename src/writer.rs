//! Dedicated writer task for outbound frames.
//!
//! Every component that sends (the task runner, the router's heartbeat
//! replies, the heartbeat monitor) holds a cloned [`WriterHandle`]. Frames
//! go through one mpsc channel to a single task that owns the transport
//! sink, so sends never contend on a lock and are written in order.
//!
//! # Architecture
//!
//! ```text
//! Task runner       ─┐
//! Message router    ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Sink
//! Heartbeat monitor ─┘
//! ```
//!
//! Ready frames are batched: the task feeds everything already queued
//! and flushes once.

use futures::SinkExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::DEFAULT_CHANNEL_CAPACITY;
use crate::error::{ChannelError, Result};
use crate::protocol::{encode, Message};
use crate::transport::FrameSink;

/// Maximum frames fed before a flush.
const MAX_BATCH_SIZE: usize = 64;

/// An encoded frame ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame(pub String);

impl OutboundFrame {
    /// Encode a message into its envelope.
    #[inline]
    pub fn from_message(message: &Message) -> Self {
        Self(encode(message))
    }

    /// Frame text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable. The writer exits once every handle is dropped.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame, waiting for channel capacity.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| ChannelError::Disconnected)
    }

    /// Whether the writer task has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The `JoinHandle` resolves when the writer stops: cleanly once all
/// handles are dropped, or with the sink's error.
pub fn spawn_writer_task(
    sink: FrameSink,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, sink));
    (WriterHandle { tx }, task)
}

/// Receive frames and write them to the sink.
async fn writer_loop(mut rx: mpsc::Receiver<OutboundFrame>, mut sink: FrameSink) -> Result<()> {
    loop {
        let first = match rx.recv().await {
            Some(f) => f,
            None => {
                // All handles dropped: close the transport.
                if let Err(e) = sink.close().await {
                    tracing::debug!(error = %e, "Sink close failed");
                }
                return Ok(());
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(&mut sink, batch).await {
            tracing::warn!(error = %e, "Writer stopped");
            return Err(e);
        }
    }
}

/// Feed a batch and flush once.
async fn write_batch(sink: &mut FrameSink, batch: Vec<OutboundFrame>) -> Result<()> {
    let count = batch.len();
    for frame in batch {
        sink.feed(frame.0).await?;
    }
    sink.flush().await?;
    tracing::trace!(count, "Wrote batch");
    Ok(())
}
