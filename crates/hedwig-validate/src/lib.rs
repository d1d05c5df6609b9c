//! hedwig-validate
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Encode/decode between [`hedwig_core::Message`] and the wire forms
//! `hedwig-wire` defines, backed by either a JSON-Schema or Protobuf
//! [`schema::SchemaRegistry`].
//!
//! This crate owns the algorithm; callers own schema compilation and
//! Protobuf codec registration, then hand the registry to a [`Validator`].

/// Encode/decode algorithm over the wire shapes `hedwig-wire` defines.
pub mod codec;
/// JSON-Schema and Protobuf schema registries, plus the startup sanity check.
pub mod schema;

use hedwig_core::Message;
use hedwig_error::{ErrorCode, HedwigError};

pub use codec::EncodedMessage;
pub use schema::{check_schema_sanity, JsonSchemaRegistry, ProtoDecodeFn, ProtoEncodeFn, ProtoRegistry, SchemaRegistry};

/// The two transport framings Hedwig supports (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingMode {
    /// A single JSON document carries both envelope and payload.
    Container,
    /// The payload travels bare; envelope metadata rides in transport
    /// attributes/message attributes.
    Attributes,
}

/// Encodes [`Message`]s to the wire and decodes them back, enforcing the
/// registered schema along the way.
pub struct Validator {
    registry: SchemaRegistry,
    schema_root: Option<String>,
    framing: FramingMode,
    /// Tolerate an unknown minor version on decode rather than rejecting it
    /// (the firehose pathway: best-effort observability over strict typing).
    firehose: bool,
}

impl Validator {
    /// Build a validator over a schema registry.
    pub fn new(registry: SchemaRegistry, schema_root: Option<String>, framing: FramingMode) -> Self {
        Self {
            registry,
            schema_root,
            framing,
            firehose: false,
        }
    }

    /// Enable the firehose pathway: unknown minor versions decode with their
    /// payload wrapped opaquely rather than being rejected.
    pub fn with_firehose(mut self, firehose: bool) -> Self {
        self.firehose = firehose;
        self
    }

    /// The transport framing this validator encodes and decodes.
    #[must_use]
    pub fn framing(&self) -> FramingMode {
        self.framing
    }

    /// Run the startup schema sanity check against every route this
    /// validator will be asked to serve.
    pub fn check_sanity(&self, reachable: impl IntoIterator<Item = hedwig_core::MessageTypeRoute>) -> Result<(), HedwigError> {
        check_schema_sanity(&self.registry, reachable)
    }

    /// Validate a message's payload against its registered schema, without
    /// framing it onto the wire. Used by both [`Self::serialize`] and the
    /// serialization self-check.
    fn validate_payload(&self, message: &Message) -> Result<Vec<u8>, HedwigError> {
        let route = hedwig_core::MessageTypeRoute::new(message.message_type.clone(), message.version.major);
        self.registry.check_minor_known(&route, message.version)?;
        match &self.registry {
            SchemaRegistry::JsonSchema(registry) => {
                let entry = registry.get(&route).expect("checked by check_minor_known");
                if let Err(e) = entry.validator.validate(&message.data) {
                    return Err(HedwigError::new(
                        ErrorCode::ValidationSchemaMismatch,
                        format!("payload does not match schema for '{route}': {e}"),
                    ));
                }
                serde_json::to_vec(&message.data).map_err(|e| {
                    HedwigError::new(ErrorCode::ValidationInvalidEnvelope, format!("failed to serialize payload: {e}"))
                })
            }
            SchemaRegistry::Protobuf(registry) => {
                let entry = registry.get(&route).expect("checked by check_minor_known");
                (entry.encode)(&message.data)
            }
        }
    }

    /// Serialize a message onto the wire in this validator's framing mode.
    ///
    /// Mirrors the deserialize algorithm's schema check (spec §4.1 step 5):
    /// the message is validated against its schema before being framed, and
    /// the result is decoded once more as a round-trip self-check before
    /// being returned.
    pub fn serialize(&self, message: &Message) -> Result<EncodedMessage, HedwigError> {
        message.validate()?;
        let raw_payload = self.validate_payload(message)?;

        let encoded = match self.framing {
            FramingMode::Container => {
                let body = codec::encode_container(message, self.schema_root.as_deref())?;
                EncodedMessage::Container { body }
            }
            FramingMode::Attributes => {
                let is_binary = matches!(self.registry, SchemaRegistry::Protobuf(_));
                codec::encode_attributes(message, self.schema_root.as_deref(), &raw_payload, is_binary)?
            }
        };

        let round_tripped = self.deserialize(&encoded)?;
        if round_tripped.data != message.data {
            return Err(HedwigError::new(
                ErrorCode::ValidationInvalidEnvelope,
                "round-trip self-check failed: decoded payload does not match the original",
            ));
        }
        Ok(encoded)
    }

    /// Decode a wire-form message back into a [`Message`], validating
    /// against the registered schema unless the firehose pathway tolerates
    /// an unknown minor version.
    pub fn deserialize(&self, encoded: &EncodedMessage) -> Result<Message, HedwigError> {
        match encoded {
            EncodedMessage::Container { body } => self.deserialize_container(body),
            EncodedMessage::Attributes { payload, attributes } => self.deserialize_attributes(payload, attributes),
        }
    }

    fn deserialize_container(&self, body: &str) -> Result<Message, HedwigError> {
        let envelope = codec::parse_container(body)?;
        let identifier = if envelope.schema.contains("#/schemas/") {
            hedwig_wire::SchemaIdentifier::parse_json_schema_url(&envelope.schema)?
        } else {
            hedwig_wire::SchemaIdentifier::parse_plain(&envelope.schema)?
        };
        let route = codec::check_identifier(&self.registry, &identifier, self.firehose)?;
        let data = self.decode_and_check(&route, identifier.version, &envelope.data)?;

        hedwig_core::MessageBuilder::new(route.message_type, identifier.version)
            .id(envelope.id)
            .timestamp(envelope.metadata.timestamp)
            .publisher(envelope.metadata.publisher)
            .headers(envelope.metadata.headers)
            .data(data)
            .build()
    }

    fn deserialize_attributes(
        &self,
        payload: &str,
        attributes: &std::collections::BTreeMap<String, String>,
    ) -> Result<Message, HedwigError> {
        let identifier = codec::parse_attribute_schema(attributes)?;
        let route = codec::check_identifier(&self.registry, &identifier, self.firehose)?;
        let raw = codec::decode_attributes_payload(payload, attributes)?;
        let unknown_minor = self.firehose && self.registry.check_minor_known(&route, identifier.version).is_err();

        let data = match &self.registry {
            SchemaRegistry::JsonSchema(_) if unknown_minor => {
                let text = String::from_utf8_lossy(&raw).into_owned();
                serde_json::Value::String(text)
            }
            SchemaRegistry::JsonSchema(_) => {
                let value: serde_json::Value = serde_json::from_slice(&raw).map_err(|e| {
                    HedwigError::new(ErrorCode::ValidationDecodeFailed, format!("malformed JSON payload: {e}"))
                })?;
                self.decode_and_check(&route, identifier.version, &value)?
            }
            SchemaRegistry::Protobuf(_) if unknown_minor => {
                let (encoded, _) = hedwig_wire::encode_binary_for_text_transport(&raw);
                serde_json::Value::String(encoded)
            }
            SchemaRegistry::Protobuf(registry) => {
                let entry = registry.get(&route).expect("checked by check_identifier");
                (entry.decode)(&raw)?
            }
        };

        let id = attributes
            .get(hedwig_wire::ATTR_ID)
            .ok_or_else(|| HedwigError::new(ErrorCode::ValidationInvalidEnvelope, "missing hedwig_id attribute"))?;
        let timestamp: i64 = attributes
            .get(hedwig_wire::ATTR_MESSAGE_TIMESTAMP)
            .ok_or_else(|| {
                HedwigError::new(ErrorCode::ValidationInvalidEnvelope, "missing hedwig_message_timestamp attribute")
            })?
            .parse()
            .map_err(|_| {
                HedwigError::new(ErrorCode::ValidationInvalidEnvelope, "malformed hedwig_message_timestamp attribute")
            })?;
        let publisher = attributes.get(hedwig_wire::ATTR_PUBLISHER).ok_or_else(|| {
            HedwigError::new(ErrorCode::ValidationInvalidEnvelope, "missing hedwig_publisher attribute")
        })?;

        let mut headers = hedwig_core::Headers::new();
        for (k, v) in attributes {
            if !hedwig_wire::RESERVED_ATTRS.contains(&k.as_str()) {
                headers.insert(k.clone(), v.clone());
            }
        }

        hedwig_core::MessageBuilder::new(route.message_type, identifier.version)
            .id(id.clone())
            .timestamp(timestamp)
            .publisher(publisher.clone())
            .headers(headers)
            .data(data)
            .build()
    }

    /// Validate a decoded payload against its schema, tolerating the
    /// firehose unknown-minor case by wrapping the payload opaquely rather
    /// than running strict validation against a schema we know is stale.
    fn decode_and_check(
        &self,
        route: &hedwig_core::MessageTypeRoute,
        version: hedwig_core::MessageVersion,
        data: &serde_json::Value,
    ) -> Result<serde_json::Value, HedwigError> {
        if self.firehose && self.registry.check_minor_known(route, version).is_err() {
            return Ok(serde_json::Value::String(data.to_string()));
        }
        if let SchemaRegistry::JsonSchema(registry) = &self.registry {
            if let Some(entry) = registry.get(route) {
                if let Err(e) = entry.validator.validate(data) {
                    return Err(HedwigError::new(
                        ErrorCode::ValidationSchemaMismatch,
                        format!("payload does not match schema for '{route}': {e}"),
                    ));
                }
            }
        }
        Ok(data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hedwig_core::{MessageBuilder, MessageVersion};

    fn build_registry() -> SchemaRegistry {
        let mut registry = JsonSchemaRegistry::new("https://hedwig.example/schema.json");
        registry
            .register(
                "trip_created",
                1,
                0,
                &serde_json::json!({
                    "type": "object",
                    "required": ["trip_id"],
                    "properties": {"trip_id": {"type": "string"}},
                }),
            )
            .unwrap();
        SchemaRegistry::JsonSchema(registry)
    }

    fn sample_message() -> Message {
        MessageBuilder::new("trip_created", MessageVersion::new(1, 0).unwrap())
            .publisher("trip-service")
            .header("region", "us-east-1")
            .data(serde_json::json!({"trip_id": "abc"}))
            .build()
            .unwrap()
    }

    #[test]
    fn container_mode_round_trips() {
        let validator = Validator::new(
            build_registry(),
            Some("https://hedwig.example/schema.json".into()),
            FramingMode::Container,
        );
        let msg = sample_message();
        let encoded = validator.serialize(&msg).unwrap();
        let decoded = validator.deserialize(&encoded).unwrap();
        assert_eq!(decoded.data, msg.data);
        assert_eq!(decoded.message_type, msg.message_type);
        assert_eq!(decoded.headers.get("region").unwrap(), "us-east-1");
    }

    #[test]
    fn attributes_mode_round_trips() {
        let validator = Validator::new(build_registry(), None, FramingMode::Attributes);
        let msg = sample_message();
        let encoded = validator.serialize(&msg).unwrap();
        let decoded = validator.deserialize(&encoded).unwrap();
        assert_eq!(decoded.data, msg.data);
        assert_eq!(decoded.headers.get("region").unwrap(), "us-east-1");
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let validator = Validator::new(build_registry(), None, FramingMode::Container);
        let msg = MessageBuilder::new("trip_created", MessageVersion::new(1, 0).unwrap())
            .publisher("trip-service")
            .data(serde_json::json!({"wrong_field": 1}))
            .build()
            .unwrap();
        let err = validator.serialize(&msg).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationSchemaMismatch);
    }

    #[test]
    fn firehose_tolerates_unknown_minor_on_decode() {
        let validator = Validator::new(build_registry(), None, FramingMode::Attributes).with_firehose(true);
        let msg = MessageBuilder::new("trip_created", MessageVersion::new(1, 0).unwrap())
            .publisher("trip-service")
            .data(serde_json::json!({"trip_id": "abc"}))
            .build()
            .unwrap();
        // Craft an encoded message carrying a minor this registry never declared.
        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert(hedwig_wire::ATTR_FORMAT_VERSION.to_string(), hedwig_wire::FORMAT_VERSION.to_string());
        attributes.insert(hedwig_wire::ATTR_ID.to_string(), msg.id.clone());
        attributes.insert(hedwig_wire::ATTR_MESSAGE_TIMESTAMP.to_string(), msg.timestamp.to_string());
        attributes.insert(hedwig_wire::ATTR_PUBLISHER.to_string(), msg.publisher.clone());
        attributes.insert(hedwig_wire::ATTR_SCHEMA.to_string(), "trip_created/1.99".to_string());
        let encoded = EncodedMessage::Attributes {
            payload: msg.data.to_string(),
            attributes,
        };
        let decoded = validator.deserialize(&encoded).unwrap();
        // Firehose wraps the unknown-minor payload opaquely rather than typed.
        assert!(matches!(decoded.data, serde_json::Value::String(_)));
    }

    #[test]
    fn without_firehose_unknown_minor_is_rejected() {
        let validator = Validator::new(build_registry(), None, FramingMode::Attributes);
        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert(hedwig_wire::ATTR_FORMAT_VERSION.to_string(), hedwig_wire::FORMAT_VERSION.to_string());
        attributes.insert(hedwig_wire::ATTR_ID.to_string(), "id".to_string());
        attributes.insert(hedwig_wire::ATTR_MESSAGE_TIMESTAMP.to_string(), "1700000000000".to_string());
        attributes.insert(hedwig_wire::ATTR_PUBLISHER.to_string(), "trip-service".to_string());
        attributes.insert(hedwig_wire::ATTR_SCHEMA.to_string(), "trip_created/1.99".to_string());
        let encoded = EncodedMessage::Attributes {
            payload: "{}".to_string(),
            attributes,
        };
        let err = validator.deserialize(&encoded).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationUnknownMinorVersion);
    }
}
