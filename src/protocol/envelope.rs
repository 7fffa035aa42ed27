//! Envelope encoding and decoding.
//!
//! Every frame on the wire is one text WebSocket message:
//! ```text
//! <WBChannel>{"messageName":"...","context":{...},"payload":{...}}</WBChannel>
//! ```
//!
//! Decoding never panics. Frames without any markers are parsed as bare
//! JSON; a frame with only one marker is rejected as unbalanced.

use crate::codec::JsonCodec;
use crate::error::DecodeError;

use super::Message;

/// Opening frame marker.
pub const FRAME_OPEN: &str = "<WBChannel>";

/// Closing frame marker.
pub const FRAME_CLOSE: &str = "</WBChannel>";

/// Wrap a message in the channel frame markers.
///
/// # Example
///
/// ```
/// use wbchannel_client::protocol::{encode, Message};
///
/// let frame = encode(&Message::client_heartbeat());
/// assert_eq!(frame, r#"<WBChannel>{"messageName":"ClientHeartbeat"}</WBChannel>"#);
/// ```
pub fn encode(message: &Message) -> String {
    // Message holds only strings and JSON values, which always serialize.
    let body = JsonCodec::encode(message).unwrap_or_default();
    let mut frame = String::with_capacity(FRAME_OPEN.len() + body.len() + FRAME_CLOSE.len());
    frame.push_str(FRAME_OPEN);
    frame.push_str(&body);
    frame.push_str(FRAME_CLOSE);
    frame
}

/// Strip the frame markers, returning the JSON body.
pub fn unwrap_body(frame: &str) -> Result<&str, DecodeError> {
    let trimmed = frame.trim();
    let opened = trimmed.strip_prefix(FRAME_OPEN);
    let body = match opened {
        Some(rest) => rest.strip_suffix(FRAME_CLOSE),
        None => trimmed.strip_suffix(FRAME_CLOSE),
    };

    let body = match (opened.is_some(), body) {
        // Both markers present.
        (true, Some(body)) => body,
        // Neither marker present: tolerated, parse the raw text.
        (false, None) => trimmed,
        _ => return Err(DecodeError::UnbalancedMarkers),
    };

    let body = body.trim();
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(body)
}

/// Decode one frame into a [`Message`].
///
/// # Example
///
/// ```
/// use wbchannel_client::protocol::{decode, MessageName};
///
/// let msg = decode(r#"<WBChannel>{"messageName":"ServerHeartbeat"}</WBChannel>"#).unwrap();
/// assert_eq!(msg.message_name, MessageName::ServerHeartbeat);
///
/// assert!(decode("<WBChannel>garbage</WBChannel>").is_err());
/// ```
pub fn decode(frame: &str) -> Result<Message, DecodeError> {
    JsonCodec::decode(unwrap_body(frame)?)
}
