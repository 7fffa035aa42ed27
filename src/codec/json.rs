//! JSON codec using `serde_json`.
//!
//! The WBChannel body is always a compact, single-line JSON object.
//! Field names are camelCase on the wire; the message types in
//! [`protocol`](crate::protocol) carry the serde attributes for that.
//!
//! # Example
//!
//! ```
//! use wbchannel_client::codec::JsonCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Ping {
//!     seq: u32,
//! }
//!
//! let encoded = JsonCodec::encode(&Ping { seq: 7 }).unwrap();
//! assert_eq!(encoded, r#"{"seq":7}"#);
//! let decoded: Ping = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, Ping { seq: 7 });
//! ```

use crate::error::{DecodeError, Result};

/// JSON codec for structured message bodies.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to a compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized (e.g. a map with
    /// non-string keys).
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    /// Decode a JSON string to a value.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Json`] if the text is not valid JSON for type T.
    #[inline]
    pub fn decode<T>(text: &str) -> std::result::Result<T, DecodeError>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    #[serde(rename_all = "camelCase")]
    struct ClientInfo {
        plugin_version: String,
        lines: u32,
    }

    #[test]
    fn test_encode_is_compact() {
        let info = ClientInfo {
            plugin_version: "1.6.0".to_string(),
            lines: 1,
        };

        let encoded = JsonCodec::encode(&info).unwrap();
        assert_eq!(encoded, r#"{"pluginVersion":"1.6.0","lines":1}"#);
        assert!(!encoded.contains('\n'));
    }

    #[test]
    fn test_decode_camel_case() {
        let decoded: ClientInfo =
            JsonCodec::decode(r#"{"pluginVersion":"2.0.0","lines":3}"#).unwrap();
        assert_eq!(decoded.plugin_version, "2.0.0");
        assert_eq!(decoded.lines, 3);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: std::result::Result<ClientInfo, DecodeError> = JsonCodec::decode("not json");
        assert!(matches!(result, Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_error_on_missing_field() {
        let result: std::result::Result<ClientInfo, DecodeError> =
            JsonCodec::decode(r#"{"lines":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unicode_preserved() {
        let text = "研发云 ✅";
        let encoded = JsonCodec::encode(&text).unwrap();
        let decoded: String = JsonCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, text);
    }
}
