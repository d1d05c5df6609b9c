//! Envelope shape (container mode) and the reserved transport-attribute
//! constants used by attributes mode.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use hedwig_core::Headers;

/// Wire format version embedded in every envelope as `hedwig_format_version`.
///
/// # Examples
///
/// ```
/// assert_eq!(hedwig_wire::FORMAT_VERSION, "1.0");
/// ```
pub const FORMAT_VERSION: &str = "1.0";

/// The `hedwig_format_version` reserved attribute name.
pub const ATTR_FORMAT_VERSION: &str = "hedwig_format_version";
/// The `hedwig_id` reserved attribute name.
pub const ATTR_ID: &str = "hedwig_id";
/// The `hedwig_message_timestamp` reserved attribute name.
pub const ATTR_MESSAGE_TIMESTAMP: &str = "hedwig_message_timestamp";
/// The `hedwig_publisher` reserved attribute name.
pub const ATTR_PUBLISHER: &str = "hedwig_publisher";
/// The `hedwig_schema` reserved attribute name.
pub const ATTR_SCHEMA: &str = "hedwig_schema";
/// The `hedwig_encoding` reserved attribute name (binary/text bridging flag).
pub const ATTR_ENCODING: &str = "hedwig_encoding";

/// All reserved attribute names, for exhaustive validation of attributes-mode
/// transport metadata.
pub const RESERVED_ATTRS: &[&str] = &[
    ATTR_FORMAT_VERSION,
    ATTR_ID,
    ATTR_MESSAGE_TIMESTAMP,
    ATTR_PUBLISHER,
    ATTR_SCHEMA,
    ATTR_ENCODING,
];

/// Value of `hedwig_encoding` when a binary payload was base64-encoded for a
/// text-only transport (SNS, Redis).
pub const ENCODING_BASE64: &str = "base64";
/// Value of `hedwig_encoding` when a string payload was UTF-8-encoded for a
/// bytes-only transport (Pub/Sub).
pub const ENCODING_UTF8: &str = "utf8";

/// Envelope metadata: the non-schema, non-id fields common to both wire
/// formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EnvelopeMetadata {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Identifies the producing service.
    pub publisher: String,
    /// User-defined headers.
    #[serde(default)]
    pub headers: Headers,
}

/// Container-mode JSON-Schema envelope, matching the wire shape exactly:
///
/// ```json
/// { "format_version": "1.0",
///   "schema": "<root>#/schemas/<type>/<major>.<minor>",
///   "id": "<uuid>",
///   "metadata": { "timestamp": <ms>, "publisher": "<str>", "headers": { ... } },
///   "data": <validated-by-schema> }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JsonEnvelope {
    /// Wire format version, always [`FORMAT_VERSION`] for messages this
    /// build produces.
    pub format_version: String,
    /// Schema identifier: `<root>#/schemas/<type>/<major>.<minor>`.
    pub schema: String,
    /// Message id.
    pub id: String,
    /// Envelope metadata.
    pub metadata: EnvelopeMetadata,
    /// The payload, already validated against the schema subtree.
    pub data: serde_json::Value,
}

/// Encode a binary payload for a text-only transport, returning the
/// base64-encoded text and the `hedwig_encoding` attribute value to attach.
pub fn encode_binary_for_text_transport(bytes: &[u8]) -> (String, &'static str) {
    use base64::Engine as _;
    (base64::engine::general_purpose::STANDARD.encode(bytes), ENCODING_BASE64)
}

/// Decode a payload previously encoded by [`encode_binary_for_text_transport`].
pub fn decode_base64_payload(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.decode(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_attrs_all_share_prefix() {
        for attr in RESERVED_ATTRS {
            assert!(attr.starts_with(hedwig_core::RESERVED_HEADER_PREFIX));
        }
    }

    #[test]
    fn binary_roundtrips_through_base64() {
        let original = b"\x00\x01\xff hello";
        let (encoded, flag) = encode_binary_for_text_transport(original);
        assert_eq!(flag, ENCODING_BASE64);
        let decoded = decode_base64_payload(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn json_envelope_round_trips() {
        let mut headers = Headers::new();
        headers.insert("region".into(), "us-east-1".into());
        let envelope = JsonEnvelope {
            format_version: FORMAT_VERSION.into(),
            schema: "https://hedwig.example/schema.json#/schemas/trip_created/1.0".into(),
            id: "11111111-1111-1111-1111-111111111111".into(),
            metadata: EnvelopeMetadata {
                timestamp: 1_700_000_000_000,
                publisher: "trip-service".into(),
                headers,
            },
            data: serde_json::json!({"trip_id": "abc"}),
        };
        let json = serde_json::to_string(&envelope).unwrap();
        let back: JsonEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope, back);
    }
}
