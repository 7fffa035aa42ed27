//! Message model carried inside a WBChannel envelope.
//!
//! Every message is a JSON object with a `messageName` discriminator, an
//! optional `context` block and an optional `payload`:
//!
//! ```text
//! {"messageName":"RegisterChannel","context":{"appGId":"aicode",...}}
//! {"messageName":"ClientHeartbeat"}
//! ```
//!
//! Responses are named `<Name>_resp`. The server is not required to echo
//! `reqId`, so correlation is by name (see [`crate::queue`]).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::{ActivityProfile, ClientProfile};
use crate::session::ChannelIdentity;

/// Message discriminator.
///
/// Known names get their own variant; anything else is kept verbatim in
/// [`MessageName::Other`] so unknown server traffic round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageName {
    /// Client → server: request a channel.
    RegisterChannel,
    /// Server → client: carries `context.channelId`.
    RegisterChannelResp,
    /// Client → server: request the API key.
    GetUserApiKey,
    /// Server → client: carries `payload.apiKey`.
    GetUserApiKeyResp,
    /// Client → server keep-alive.
    ClientHeartbeat,
    /// Server → client keep-alive.
    ServerHeartbeat,
    /// Client → server answer to [`MessageName::ServerHeartbeat`].
    ClientHeartbeatResponse,
    /// Client → server business message.
    UserActivityNotify,
    /// Server → client acknowledgment of a business message.
    UserActivityNotifyResp,
    /// Server → client session termination.
    Closed,
    /// Any other discriminator.
    Other(String),
}

impl MessageName {
    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            MessageName::RegisterChannel => "RegisterChannel",
            MessageName::RegisterChannelResp => "RegisterChannel_resp",
            MessageName::GetUserApiKey => "GetUserApiKey",
            MessageName::GetUserApiKeyResp => "GetUserApiKey_resp",
            MessageName::ClientHeartbeat => "ClientHeartbeat",
            MessageName::ServerHeartbeat => "ServerHeartbeat",
            MessageName::ClientHeartbeatResponse => "ClientHeartbeatResponse",
            MessageName::UserActivityNotify => "UserActivityNotify",
            MessageName::UserActivityNotifyResp => "UserActivityNotify_resp",
            MessageName::Closed => "Closed",
            MessageName::Other(name) => name,
        }
    }

    /// The `<Name>_resp` discriminator a server answers this message with.
    pub fn response(&self) -> MessageName {
        MessageName::from(format!("{}_resp", self.as_str()))
    }

    /// Whether this names a response (`*_resp`).
    pub fn is_response(&self) -> bool {
        self.as_str().ends_with("_resp")
    }

    /// Whether this is one of the keep-alive discriminators.
    pub fn is_heartbeat(&self) -> bool {
        matches!(
            self,
            MessageName::ClientHeartbeat
                | MessageName::ServerHeartbeat
                | MessageName::ClientHeartbeatResponse
        )
    }
}

impl From<&str> for MessageName {
    fn from(name: &str) -> Self {
        match name {
            "RegisterChannel" => MessageName::RegisterChannel,
            "RegisterChannel_resp" => MessageName::RegisterChannelResp,
            "GetUserApiKey" => MessageName::GetUserApiKey,
            "GetUserApiKey_resp" => MessageName::GetUserApiKeyResp,
            "ClientHeartbeat" => MessageName::ClientHeartbeat,
            "ServerHeartbeat" => MessageName::ServerHeartbeat,
            "ClientHeartbeatResponse" => MessageName::ClientHeartbeatResponse,
            "UserActivityNotify" => MessageName::UserActivityNotify,
            "UserActivityNotify_resp" => MessageName::UserActivityNotifyResp,
            "Closed" => MessageName::Closed,
            other => MessageName::Other(other.to_string()),
        }
    }
}

impl From<String> for MessageName {
    fn from(name: String) -> Self {
        match MessageName::from(name.as_str()) {
            MessageName::Other(_) => MessageName::Other(name),
            known => known,
        }
    }
}

impl From<MessageName> for String {
    fn from(name: MessageName) -> Self {
        match name {
            MessageName::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `context` block: routing and identity fields.
///
/// All fields are optional on the wire; unknown fields are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// Repeats the envelope discriminator (outbound requests only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_name: Option<String>,
    /// Application group id.
    #[serde(rename = "appGId", default, skip_serializing_if = "Option::is_none")]
    pub app_gid: Option<String>,
    /// Invoker (user) identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoker_id: Option<String>,
    /// Client protocol version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Caller-supplied session token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
    /// Issued credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Server-assigned channel identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Fields this client does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Client metadata sent with `GetUserApiKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRequest {
    /// IDE kind, e.g. `vscode`.
    pub client_type: String,
    /// IDE version.
    pub client_version: String,
    /// OS/arch, e.g. `windows-x64`.
    pub client_platform: String,
    /// Plugin version.
    pub plugin_version: String,
}

/// Nested `client` object of a `UserActivityNotify` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// OS/arch.
    pub platform: String,
    /// IDE kind.
    #[serde(rename = "type")]
    pub client_type: String,
    /// IDE version.
    pub version: String,
    /// Plugin version.
    pub plugin_version: String,
}

/// Payload of a `UserActivityNotify` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    /// Activity kind, e.g. `code_display`.
    pub activity_type: String,
    /// Service name, e.g. `codegen`.
    pub service: String,
    /// Lines affected.
    pub lines: u32,
    /// Occurrence count.
    pub count: u32,
    /// Reporting client.
    pub client: ClientInfo,
}

/// One decoded WBChannel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Discriminator (`messageName` on the wire).
    pub message_name: MessageName,
    /// Routing/identity block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    /// Message-specific body. An explicit `null` is kept as `Some(Null)`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub payload: Option<Value>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Generate a fresh correlation id.
pub fn new_req_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    /// Bare message with only a discriminator.
    pub fn new(name: MessageName) -> Self {
        Self {
            message_name: name,
            context: None,
            payload: None,
        }
    }

    /// Attach a context block.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Serialize `body` as the payload.
    ///
    /// A body that fails to serialize is logged and the message keeps no
    /// payload.
    fn with_body<T: Serialize>(self, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(payload) => self.with_payload(payload),
            Err(e) => {
                tracing::error!(name = %self.message_name, error = %e, "Payload not serializable");
                self
            }
        }
    }

    /// `ClientHeartbeat` (no context, no payload).
    pub fn client_heartbeat() -> Self {
        Self::new(MessageName::ClientHeartbeat)
    }

    /// `ClientHeartbeatResponse` (no context, no payload).
    pub fn heartbeat_response() -> Self {
        Self::new(MessageName::ClientHeartbeatResponse)
    }

    /// `RegisterChannel`, the first handshake step.
    pub fn register_channel(profile: &ClientProfile, session_token: &str, req_id: &str) -> Self {
        let name = MessageName::RegisterChannel;
        let context = Context {
            message_name: Some(name.to_string()),
            req_id: Some(req_id.to_string()),
            app_gid: Some(profile.app_gid.clone()),
            invoker_id: Some(profile.invoker_id.clone()),
            version: Some(profile.version.clone()),
            session_id: Some(session_token.to_string()),
            ..Context::default()
        };
        Self::new(name).with_context(context)
    }

    /// `GetUserApiKey`, the second handshake step.
    pub fn get_user_api_key(profile: &ClientProfile, session_token: &str, req_id: &str) -> Self {
        let name = MessageName::GetUserApiKey;
        let context = Context {
            message_name: Some(name.to_string()),
            req_id: Some(req_id.to_string()),
            invoker_id: Some(profile.invoker_id.clone()),
            session_id: Some(session_token.to_string()),
            version: Some(profile.version.clone()),
            ..Context::default()
        };
        let request = ApiKeyRequest {
            client_type: profile.client_type.clone(),
            client_version: profile.client_version.clone(),
            client_platform: profile.client_platform.clone(),
            plugin_version: profile.plugin_version.clone(),
        };
        Self::new(name).with_context(context).with_body(&request)
    }

    /// `UserActivityNotify`, one business unit.
    ///
    /// Requires a [`ChannelIdentity`], which only a completed handshake
    /// produces.
    pub fn user_activity(
        profile: &ClientProfile,
        activity: &ActivityProfile,
        identity: &ChannelIdentity,
        req_id: &str,
    ) -> Self {
        let name = MessageName::UserActivityNotify;
        let context = Context {
            message_name: Some(name.to_string()),
            req_id: Some(req_id.to_string()),
            invoker_id: Some(profile.invoker_id.clone()),
            version: Some(profile.version.clone()),
            api_key: Some(identity.api_key.clone()),
            channel_id: Some(identity.channel_id.clone()),
            ..Context::default()
        };
        let body = UserActivity {
            activity_type: activity.activity_type.clone(),
            service: activity.service.clone(),
            lines: activity.lines,
            count: activity.count,
            client: ClientInfo {
                platform: profile.client_platform.clone(),
                client_type: profile.client_type.clone(),
                version: profile.client_version.clone(),
                plugin_version: profile.plugin_version.clone(),
            },
        };
        Self::new(name).with_context(context).with_body(&body)
    }

    /// Correlation id from the context, if any.
    pub fn req_id(&self) -> Option<&str> {
        self.context.as_ref()?.req_id.as_deref()
    }

    /// `context.channelId`, if any.
    pub fn channel_id(&self) -> Option<&str> {
        self.context.as_ref()?.channel_id.as_deref()
    }

    /// `payload.apiKey`, falling back to `context.apiKey`.
    pub fn api_key(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.get("apiKey"))
            .and_then(Value::as_str)
            .or_else(|| self.context.as_ref()?.api_key.as_deref())
    }
}
