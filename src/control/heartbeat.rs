//! Outbound keep-alive.
//!
//! Sends `ClientHeartbeat` every `interval + random(0..=jitter)` while the
//! connection is live. A failed send ends the monitor only; the task keeps
//! going until it notices the disconnect itself. Inbound `ServerHeartbeat`
//! frames are answered by the router.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;

use crate::connection::ConnectionManager;
use crate::protocol::Message;

/// Periodic `ClientHeartbeat` sender.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatMonitor {
    interval: Duration,
    jitter: Duration,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, jitter: Duration) -> Self {
        Self { interval, jitter }
    }

    /// Delay before the next beat.
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }

    /// Run until disconnected.
    pub fn spawn(self, conn: Arc<ConnectionManager>) -> JoinHandle<()> {
        tokio::spawn(self.run(conn))
    }

    async fn run(self, conn: Arc<ConnectionManager>) {
        let mut beats: u64 = 0;
        loop {
            let delay = self.next_delay();
            tokio::select! {
                _ = conn.disconnected() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            if !conn.is_connected() {
                break;
            }
            if let Err(e) = conn.send(&Message::client_heartbeat()).await {
                tracing::warn!(error = %e, "Heartbeat failed, monitor stopping");
                break;
            }
            beats += 1;
            tracing::debug!(beats, "ClientHeartbeat sent");
        }
        tracing::debug!(beats, "Heartbeat monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageName;
    use crate::transport::MemoryConnector;
    use crate::writer::WriterConfig;

    #[test]
    fn test_delay_within_jitter() {
        let monitor = HeartbeatMonitor::new(Duration::from_secs(18), Duration::from_secs(4));
        for _ in 0..100 {
            let delay = monitor.next_delay();
            assert!(delay >= Duration::from_secs(18));
            assert!(delay <= Duration::from_secs(22));
        }
    }

    #[test]
    fn test_zero_jitter_is_fixed() {
        let monitor = HeartbeatMonitor::new(Duration::from_secs(10), Duration::ZERO);
        assert_eq!(monitor.next_delay(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_sends_beats_until_disconnected() {
        let (connector, mut listener) = MemoryConnector::pair();
        let conn = Arc::new(ConnectionManager::new(Arc::new(connector), WriterConfig::default()));
        conn.open("memory://hb").await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        let handle = HeartbeatMonitor::new(Duration::from_millis(10), Duration::ZERO)
            .spawn(conn.clone());

        for _ in 0..2 {
            let msg = peer.recv_message().await.unwrap();
            assert_eq!(msg.message_name, MessageName::ClientHeartbeat);
        }

        conn.close().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
