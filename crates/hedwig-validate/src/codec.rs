//! The encode/decode algorithm: container-mode JSON envelopes and
//! attributes-mode (payload + transport attributes), built on the wire
//! shapes `hedwig-wire` defines.

use std::collections::BTreeMap;

use hedwig_core::{Message, MessageTypeRoute};
use hedwig_error::{ErrorCode, HedwigError};
use hedwig_wire::{
    decode_base64_payload, encode_binary_for_text_transport, EnvelopeMetadata, JsonEnvelope, SchemaIdentifier,
    ATTR_ENCODING, ATTR_FORMAT_VERSION, ATTR_ID, ATTR_MESSAGE_TIMESTAMP, ATTR_PUBLISHER, ATTR_SCHEMA,
    ENCODING_BASE64, FORMAT_VERSION,
};

use crate::schema::SchemaRegistry;

/// Transport-level framing a [`crate::Validator`] produces or consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedMessage {
    /// Container mode: a single JSON document carrying envelope and payload.
    Container {
        /// The serialized [`JsonEnvelope`].
        body: String,
    },
    /// Attributes mode: a separate payload plus transport attributes/message
    /// attributes carrying the envelope metadata.
    Attributes {
        /// The payload, JSON text for JSON-Schema or (possibly base64'd)
        /// Protobuf bytes rendered as text.
        payload: String,
        /// Transport attributes, including the `hedwig_*` reserved set.
        attributes: BTreeMap<String, String>,
    },
}

/// Build the schema identifier string `<root>#/schemas/<type>/<major>.<minor>`
/// or `<type>/<major>.<minor>` when no schema root is configured.
fn format_schema_id(schema_root: Option<&str>, route: &MessageTypeRoute, minor: u32) -> String {
    let plain = format!("{}/{}.{minor}", route.message_type, route.major_version.major);
    match schema_root {
        Some(root) => format!("{root}#/schemas/{plain}"),
        None => plain,
    }
}

/// Encode a [`Message`] into container-mode JSON.
pub fn encode_container(message: &Message, schema_root: Option<&str>) -> Result<String, HedwigError> {
    let route = MessageTypeRoute::new(message.message_type.clone(), message.version.major);
    let envelope = JsonEnvelope {
        format_version: FORMAT_VERSION.to_string(),
        schema: format_schema_id(schema_root, &route, message.version.minor),
        id: message.id.clone(),
        metadata: EnvelopeMetadata {
            timestamp: message.timestamp,
            publisher: message.publisher.clone(),
            headers: message.headers.clone(),
        },
        data: message.data.clone(),
    };
    serde_json::to_string(&envelope).map_err(|e| {
        HedwigError::new(ErrorCode::ValidationInvalidEnvelope, format!("failed to serialize envelope: {e}"))
    })
}

/// Decode container-mode JSON back into a parsed envelope, without yet
/// validating the payload against a schema.
pub fn parse_container(body: &str) -> Result<JsonEnvelope, HedwigError> {
    serde_json::from_str(body)
        .map_err(|e| HedwigError::new(ErrorCode::ValidationInvalidEnvelope, format!("malformed envelope: {e}")))
}

/// Encode a [`Message`] into attributes-mode: a bare payload plus the
/// `hedwig_*` reserved transport attributes.
///
/// `raw_payload` is the already-serialized data (JSON text for JSON-Schema,
/// raw bytes rendered to text for Protobuf). When `is_binary` is set the
/// payload is base64-encoded and `hedwig_encoding` is attached, satisfying
/// the binary/text bridging requirement for transports like SNS and Redis
/// that only carry text.
pub fn encode_attributes(
    message: &Message,
    schema_root: Option<&str>,
    raw_payload: &[u8],
    is_binary: bool,
) -> Result<EncodedMessage, HedwigError> {
    let route = MessageTypeRoute::new(message.message_type.clone(), message.version.major);
    let mut attributes = BTreeMap::new();
    attributes.insert(ATTR_FORMAT_VERSION.to_string(), FORMAT_VERSION.to_string());
    attributes.insert(ATTR_ID.to_string(), message.id.clone());
    attributes.insert(ATTR_MESSAGE_TIMESTAMP.to_string(), message.timestamp.to_string());
    attributes.insert(ATTR_PUBLISHER.to_string(), message.publisher.clone());
    attributes.insert(
        ATTR_SCHEMA.to_string(),
        format_schema_id(schema_root, &route, message.version.minor),
    );
    for (k, v) in &message.headers {
        attributes.insert(k.clone(), v.clone());
    }

    let payload = if is_binary {
        let (encoded, flag) = encode_binary_for_text_transport(raw_payload);
        attributes.insert(ATTR_ENCODING.to_string(), flag.to_string());
        encoded
    } else {
        String::from_utf8(raw_payload.to_vec()).map_err(|e| {
            HedwigError::new(ErrorCode::ValidationInvalidEnvelope, format!("payload is not valid UTF-8: {e}"))
        })?
    };

    Ok(EncodedMessage::Attributes { payload, attributes })
}

/// Recover the raw payload bytes from an attributes-mode message, reversing
/// base64 bridging if `hedwig_encoding` says it was applied.
pub fn decode_attributes_payload(payload: &str, attributes: &BTreeMap<String, String>) -> Result<Vec<u8>, HedwigError> {
    match attributes.get(ATTR_ENCODING).map(String::as_str) {
        Some(ENCODING_BASE64) => decode_base64_payload(payload).map_err(|e| {
            HedwigError::new(ErrorCode::ValidationDecodeFailed, format!("malformed base64 payload: {e}"))
        }),
        _ => Ok(payload.as_bytes().to_vec()),
    }
}

/// Parse the `hedwig_schema` reserved attribute into a [`SchemaIdentifier`].
pub fn parse_attribute_schema(attributes: &BTreeMap<String, String>) -> Result<SchemaIdentifier, HedwigError> {
    let raw = attributes.get(ATTR_SCHEMA).ok_or_else(|| {
        HedwigError::new(ErrorCode::ValidationInvalidEnvelope, format!("missing required attribute '{ATTR_SCHEMA}'"))
    })?;
    if raw.contains("#/schemas/") {
        SchemaIdentifier::parse_json_schema_url(raw)
    } else {
        SchemaIdentifier::parse_plain(raw)
    }
}

/// Validate and look up the schema for a parsed identifier, running the
/// unknown-minor check. When `firehose` is set, an unknown minor is
/// tolerated rather than rejected (spec firehose pathway).
pub fn check_identifier(
    registry: &SchemaRegistry,
    identifier: &SchemaIdentifier,
    firehose: bool,
) -> Result<MessageTypeRoute, HedwigError> {
    let route = MessageTypeRoute::new(identifier.message_type.clone(), identifier.version.major);
    match registry.check_minor_known(&route, identifier.version) {
        Ok(()) => Ok(route),
        Err(err) if firehose && err.code == ErrorCode::ValidationUnknownMinorVersion => Ok(route),
        Err(err) => Err(err),
    }
}
