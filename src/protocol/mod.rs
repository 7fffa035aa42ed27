//! Protocol module - envelope framing and the message model.
//!
//! This module implements the text protocol spoken on the channel:
//! - `<WBChannel>` envelope encoding/decoding
//! - Message struct with discriminator, context and payload
//! - Builders for every message this client sends

mod envelope;
mod message;

pub use envelope::{decode, encode, unwrap_body, FRAME_CLOSE, FRAME_OPEN};
pub use message::{
    new_req_id, ApiKeyRequest, ClientInfo, Context, Message, MessageName, UserActivity,
};
