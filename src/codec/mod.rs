//! Codec module - serialization/deserialization for message bodies.
//!
//! - [`JsonCodec`] - compact JSON using `serde_json`
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the envelope layer picks its codec at compile time.

mod json;

pub use json::JsonCodec;
