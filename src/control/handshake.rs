//! Two-step handshake: channel registration, then credential retrieval.
//!
//! Each step sends one request and waits on the correlation queue for its
//! `<Name>_resp`, skipping unrelated traffic. Both must succeed before a
//! [`ChannelIdentity`] exists, and business messages cannot be built
//! without one.

use crate::config::ClientProfile;
use crate::connection::ConnectionManager;
use crate::error::{ChannelError, Result};
use crate::protocol::{new_req_id, Message};
use crate::queue::CorrelationQueue;
use crate::session::{ChannelIdentity, Session};

/// Step name reported for registration failures.
pub const STEP_REGISTER_CHANNEL: &str = "RegisterChannel";

/// Step name reported for credential failures.
pub const STEP_GET_USER_API_KEY: &str = "GetUserApiKey";

/// Drives the handshake for one session.
#[derive(Debug, Clone, Copy)]
pub struct Handshake<'a> {
    profile: &'a ClientProfile,
}

impl<'a> Handshake<'a> {
    pub fn new(profile: &'a ClientProfile) -> Self {
        Self { profile }
    }

    /// Run both steps, storing the results on `session`.
    ///
    /// Any failure is reported as [`ChannelError::Handshake`] naming the step.
    pub async fn run(
        &self,
        conn: &ConnectionManager,
        queue: &mut CorrelationQueue,
        session: &mut Session,
    ) -> Result<ChannelIdentity> {
        let req_id = new_req_id();
        let request = Message::register_channel(self.profile, session.session_token(), &req_id);
        let response = exchange(conn, queue, STEP_REGISTER_CHANNEL, request, &req_id).await?;
        let channel_id = response
            .channel_id()
            .ok_or_else(|| failed(STEP_REGISTER_CHANNEL, "response has no channelId"))?;
        session.set_channel_id(channel_id);
        tracing::info!(channel_id, "Channel registered");

        let req_id = new_req_id();
        let request = Message::get_user_api_key(self.profile, session.session_token(), &req_id);
        let response = exchange(conn, queue, STEP_GET_USER_API_KEY, request, &req_id).await?;
        let api_key = response
            .api_key()
            .ok_or_else(|| failed(STEP_GET_USER_API_KEY, "response has no apiKey"))?;
        session.set_credential(api_key);
        tracing::info!("Credential issued");

        session
            .identity()
            .ok_or_else(|| failed(STEP_GET_USER_API_KEY, "identity incomplete"))
    }
}

async fn exchange(
    conn: &ConnectionManager,
    queue: &mut CorrelationQueue,
    step: &'static str,
    request: Message,
    req_id: &str,
) -> Result<Message> {
    if !conn.is_connected() {
        return Err(failed(step, "not connected"));
    }

    let expected = request.message_name.response();
    tracing::debug!(step, req_id, "Sending handshake request");
    conn.send(&request)
        .await
        .map_err(|e| failed(step, e.to_string()))?;

    queue
        .await_response(&expected, Some(req_id))
        .await
        .map_err(|e| failed(step, e.to_string()))
}

fn failed(step: &'static str, reason: impl Into<String>) -> ChannelError {
    ChannelError::Handshake {
        step,
        reason: reason.into(),
    }
}
