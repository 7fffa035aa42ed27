//! Per-run session state and the background activities bound to it.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::connection::ConnectionManager;

/// Channel id and credential, both issued by the handshake.
///
/// Business messages can only be built from one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIdentity {
    /// Server-assigned channel id.
    pub channel_id: String,
    /// Issued API key.
    pub api_key: String,
}

/// State of one run against the server.
#[derive(Debug, Clone)]
pub struct Session {
    endpoint: String,
    session_token: String,
    channel_id: Option<String>,
    credential: Option<String>,
}

impl Session {
    /// Fresh session; no channel id or credential yet.
    pub fn new(endpoint: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            session_token: session_token.into(),
            channel_id: None,
            credential: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub(crate) fn set_channel_id(&mut self, channel_id: impl Into<String>) {
        self.channel_id = Some(channel_id.into());
    }

    pub(crate) fn set_credential(&mut self, credential: impl Into<String>) {
        self.credential = Some(credential.into());
    }

    /// The identity, once both handshake steps have completed.
    pub fn identity(&self) -> Option<ChannelIdentity> {
        match (&self.channel_id, &self.credential) {
            (Some(channel_id), Some(api_key)) => Some(ChannelIdentity {
                channel_id: channel_id.clone(),
                api_key: api_key.clone(),
            }),
            _ => None,
        }
    }
}

/// Background tasks of one connection (router, heartbeat monitor).
///
/// [`shutdown`](Activities::shutdown) closes the connection and joins them;
/// anything still running when this is dropped gets aborted.
#[derive(Debug, Default)]
pub struct Activities {
    router: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Activities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_router(&mut self, handle: JoinHandle<()>) {
        self.router = Some(handle);
    }

    pub fn set_heartbeat(&mut self, handle: JoinHandle<()>) {
        self.heartbeat = Some(handle);
    }

    /// Number of activities still tracked.
    pub fn len(&self) -> usize {
        self.router.iter().chain(self.heartbeat.iter()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the connection and wait for every activity to stop.
    ///
    /// Each activity gets `grace` to notice the disconnect before it is
    /// aborted.
    pub async fn shutdown(&mut self, conn: &ConnectionManager, grace: Duration) {
        conn.close().await;

        let handles = [("router", self.router.take()), ("heartbeat", self.heartbeat.take())];
        for (name, handle) in handles {
            let Some(mut handle) = handle else { continue };
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => tracing::debug!(activity = name, "Stopped"),
                Ok(Err(e)) => tracing::warn!(activity = name, error = %e, "Activity failed"),
                Err(_) => {
                    tracing::warn!(activity = name, "Did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
    }
}

impl Drop for Activities {
    fn drop(&mut self) {
        for handle in self.router.iter().chain(self.heartbeat.iter()) {
            handle.abort();
        }
    }
}
