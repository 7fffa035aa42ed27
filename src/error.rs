//! Error types for wbchannel-client.

use thiserror::Error;

/// Why an inbound frame could not be turned into a [`Message`](crate::protocol::Message).
///
/// Decoding is total: the router logs these and keeps reading.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame was empty (or only markers/whitespace).
    #[error("empty frame")]
    Empty,

    /// Only one of `<WBChannel>` / `</WBChannel>` was present.
    #[error("unbalanced frame markers")]
    UnbalancedMarkers,

    /// Body is not a JSON message with a `messageName`.
    #[error("unparseable body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Main error type for all channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The transport could not be established.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Endpoint that refused us.
        url: String,
        /// Transport-level reason.
        reason: String,
    },

    /// The handshake did not produce a channel identity and credential.
    #[error("handshake failed at {step}: {reason}")]
    Handshake {
        /// Handshake step name (`RegisterChannel` or `GetUserApiKey`).
        step: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// A frame could not be handed to the transport.
    #[error("send failed: {0}")]
    Send(String),

    /// Inbound frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The server sent `Closed` or the transport went away.
    #[error("channel disconnected")]
    Disconnected,

    /// Another task already holds the session guard.
    #[error("channel busy, retry later")]
    Busy,

    /// No matching response arrived within the exchange timeout.
    #[error("timed out after {timeout_ms}ms waiting for {expected}")]
    ExchangeTimeout {
        /// Discriminator we were waiting for.
        expected: String,
        /// How long we waited.
        timeout_ms: u64,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (config files, sockets).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ChannelError {
    /// Whether this error means the connection is gone.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ChannelError::Disconnected | ChannelError::WebSocket(_))
    }
}

/// Result type alias using ChannelError.
pub type Result<T> = std::result::Result<T, ChannelError>;
