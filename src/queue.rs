//! Correlation queue between the message router and the exchange in flight.
//!
//! The router pushes every non-heartbeat message here in arrival order.
//! Exactly one exchange reads at a time, so the next matching message is
//! the response to the request just sent. Every wait is bounded by the
//! exchange timeout.
//!
//! Matching is by discriminator name only; servers are not required to
//! echo `reqId`. With [`set_req_id_check`](CorrelationQueue::set_req_id_check)
//! enabled, a response echoing a different `reqId` is treated as stale and
//! skipped. Responses without one are still accepted.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{ChannelError, Result};
use crate::protocol::{Message, MessageName};

/// Sending side, owned by the router.
pub type QueueSender = mpsc::UnboundedSender<Message>;

/// Receiving side of the correlation queue.
#[derive(Debug)]
pub struct CorrelationQueue {
    rx: mpsc::UnboundedReceiver<Message>,
    timeout: Duration,
    check_req_id: bool,
}

impl CorrelationQueue {
    /// Create a queue whose waits are bounded by `timeout`.
    pub fn new(timeout: Duration) -> (QueueSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                rx,
                timeout,
                check_req_id: false,
            },
        )
    }

    /// Per-wait bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Skip responses whose echoed `reqId` differs from the one sent.
    ///
    /// Off by default.
    pub fn set_req_id_check(&mut self, enabled: bool) {
        self.check_req_id = enabled;
    }

    /// Next queued message, whatever its name.
    ///
    /// Fails with `ExchangeTimeout` if nothing arrives in time and with
    /// `Disconnected` once the router has stopped.
    pub async fn next(&mut self) -> Result<Message> {
        let deadline = Instant::now() + self.timeout;
        self.next_before(deadline, "any message").await
    }

    /// Take an already queued message without waiting.
    pub fn try_next(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Wait for the response named `expected`.
    ///
    /// Other messages are consumed and skipped. If the `reqId` check is on
    /// and `req_id` is given, a response echoing a different `reqId` is
    /// skipped too. The whole wait shares one deadline.
    pub async fn await_response(
        &mut self,
        expected: &MessageName,
        req_id: Option<&str>,
    ) -> Result<Message> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let message = self.next_before(deadline, expected.as_str()).await?;

            if &message.message_name != expected {
                tracing::debug!(
                    expected = %expected,
                    received = %message.message_name,
                    "Skipping unrelated message"
                );
                continue;
            }

            if self.is_stale(&message, req_id) {
                continue;
            }
            return Ok(message);
        }
    }

    /// Next message answering the request just sent, whatever its name.
    ///
    /// `expected` only labels the timeout and flags replies under another
    /// name. Stale ids are skipped as in [`await_response`](Self::await_response).
    pub async fn next_reply(
        &mut self,
        expected: &MessageName,
        req_id: Option<&str>,
    ) -> Result<Message> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let message = self.next_before(deadline, expected.as_str()).await?;
            if self.is_stale(&message, req_id) {
                continue;
            }
            if &message.message_name != expected {
                tracing::debug!(
                    expected = %expected,
                    received = %message.message_name,
                    "Reply under another name"
                );
            }
            return Ok(message);
        }
    }

    fn is_stale(&self, message: &Message, req_id: Option<&str>) -> bool {
        match (req_id, message.req_id()) {
            (Some(sent), Some(echoed)) if self.check_req_id && sent != echoed => {
                tracing::warn!(
                    name = %message.message_name,
                    sent,
                    echoed,
                    "Skipping response for another request"
                );
                true
            }
            _ => false,
        }
    }

    async fn next_before(&mut self, deadline: Instant, expected: &str) -> Result<Message> {
        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(ChannelError::Disconnected),
            Err(_) => Err(ChannelError::ExchangeTimeout {
                expected: expected.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}
