//! The [`Message`] contract type and its fallible builder.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hedwig_error::{ErrorCode, HedwigError};

use crate::version::MessageVersion;

/// Reserved transport-attribute prefix. No user header key may use it.
///
/// The individual reserved attribute names (`hedwig_format_version`,
/// `hedwig_id`, ...) are wire-framing concerns and live in `hedwig-wire`.
pub const RESERVED_HEADER_PREFIX: &str = "hedwig_";

/// User-defined headers: an ordered-insertion string-to-string mapping.
///
/// Ordered on insertion (not sorted) so a republished message preserves the
/// header order a caller supplied, matching spec §3's "ordered-insertion
/// mapping" requirement.
pub type Headers = IndexMap<String, String>;

/// Transport-specific metadata attached to a [`Message`] on deserialization.
///
/// Never part of the wire form; set only by the consumer side of a backend.
/// Modeled as a sum type (rather than three unrelated structs) so callers can
/// exhaustively match on which transport delivered a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderMetadata {
    /// No provider metadata has been attached (messages fresh off the
    /// publisher, or built directly in tests).
    None,
    /// SQS (and SNS-via-SQS) delivery metadata.
    Sqs {
        /// Opaque receipt handle used to ack/nack/extend visibility.
        receipt_handle: String,
        /// Time the message was first sent to the queue.
        sent_timestamp: DateTime<Utc>,
        /// Time the message was first received by any consumer, if known.
        first_receive_timestamp: Option<DateTime<Utc>>,
        /// Number of times this message has been received.
        receive_count: u32,
    },
    /// Google Cloud Pub/Sub delivery metadata.
    PubSub {
        /// Ack id used to ack/nack/modify the ack deadline.
        ack_id: String,
        /// Full subscription path the message was pulled from.
        subscription_path: String,
        /// Time the message was published.
        publish_time: DateTime<Utc>,
        /// Number of delivery attempts, when dead-lettering is configured.
        delivery_attempt: Option<u32>,
    },
    /// Redis Streams delivery metadata.
    Redis {
        /// Stream key the message was read from.
        stream: String,
        /// Stream entry id (e.g. `"1691020800000-0"`).
        entry_id: String,
        /// Number of delivery attempts recorded by the consumer group.
        delivery_attempt: u32,
    },
}

impl Default for ProviderMetadata {
    fn default() -> Self {
        Self::None
    }
}

/// An immutable publish/subscribe message.
///
/// Construct via [`MessageBuilder`]; modify via [`Message::with_headers`] or
/// [`Message::with_provider_metadata`], both of which return a new value
/// rather than mutating in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Message {
    /// Unique identifier, a UUID string by default.
    pub id: String,
    /// Message type, e.g. `"trip_created"`.
    pub message_type: String,
    /// Schema version.
    pub version: MessageVersion,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Identifies the producing service.
    pub publisher: String,
    /// User-defined headers.
    #[serde(default)]
    pub headers: Headers,
    /// Opaque payload: a decoded value for Protobuf, a JSON value for
    /// JSON-Schema.
    pub data: serde_json::Value,
    /// Transport-specific metadata, set on deserialization only.
    #[serde(default, skip_serializing_if = "is_no_provider_metadata")]
    pub provider_metadata: ProviderMetadata,
}

fn is_no_provider_metadata(m: &ProviderMetadata) -> bool {
    matches!(m, ProviderMetadata::None)
}

impl Message {
    /// Validate the structural invariants spec §3 requires of every message.
    pub fn validate(&self) -> Result<(), HedwigError> {
        if self.id.is_empty() {
            return Err(HedwigError::new(ErrorCode::ValidationInvalidMessage, "id must not be empty"));
        }
        if self.message_type.is_empty() {
            return Err(HedwigError::new(
                ErrorCode::ValidationInvalidMessage,
                "type must not be empty",
            ));
        }
        if self.version.major == 0 {
            return Err(HedwigError::new(
                ErrorCode::ValidationInvalidMessage,
                "version major component must be non-zero",
            ));
        }
        if self.timestamp <= 0 {
            return Err(HedwigError::new(
                ErrorCode::ValidationInvalidMessage,
                "timestamp must be greater than zero",
            ));
        }
        for key in self.headers.keys() {
            if key.starts_with(RESERVED_HEADER_PREFIX) {
                return Err(HedwigError::new(
                    ErrorCode::ValidationReservedHeader,
                    format!("header key '{key}' uses the reserved '{RESERVED_HEADER_PREFIX}' prefix"),
                )
                .with_context("header", key.clone()));
            }
        }
        Ok(())
    }

    /// Return a copy of this message with its headers replaced.
    pub fn with_headers(&self, headers: Headers) -> Self {
        Self {
            headers,
            ..self.clone()
        }
    }

    /// Return a copy of this message with its provider metadata replaced.
    pub fn with_provider_metadata(&self, provider_metadata: ProviderMetadata) -> Self {
        Self {
            provider_metadata,
            ..self.clone()
        }
    }
}

/// Fallible builder for [`Message`], enforcing spec §3's invariants at
/// construction time rather than only at validation time.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    id: Option<String>,
    message_type: Option<String>,
    version: Option<MessageVersion>,
    timestamp: Option<i64>,
    publisher: Option<String>,
    headers: Headers,
    data: Option<serde_json::Value>,
}

impl MessageBuilder {
    /// Start a builder for the given message type and version.
    pub fn new(message_type: impl Into<String>, version: MessageVersion) -> Self {
        Self {
            message_type: Some(message_type.into()),
            version: Some(version),
            ..Default::default()
        }
    }

    /// Override the generated id. Defaults to a random UUID v4.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Override the timestamp. Defaults to "now" in milliseconds.
    pub fn timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    /// Set the publishing service identifier.
    pub fn publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    /// Add a single header, in insertion order.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Replace the full header set.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the payload.
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Finalize the message, validating all invariants.
    pub fn build(self) -> Result<Message, HedwigError> {
        let message_type = self
            .message_type
            .ok_or_else(|| HedwigError::new(ErrorCode::ValidationInvalidMessage, "message type is required"))?;
        let version = self
            .version
            .ok_or_else(|| HedwigError::new(ErrorCode::ValidationInvalidMessage, "version is required"))?;
        let publisher = self
            .publisher
            .ok_or_else(|| HedwigError::new(ErrorCode::ValidationInvalidMessage, "publisher is required"))?;

        let message = Message {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            message_type,
            version,
            timestamp: self.timestamp.unwrap_or_else(|| Utc::now().timestamp_millis()),
            publisher,
            headers: self.headers,
            data: self.data.unwrap_or(serde_json::Value::Null),
            provider_metadata: ProviderMetadata::None,
        };
        message.validate()?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1() -> MessageVersion {
        MessageVersion::new(1, 0).unwrap()
    }

    #[test]
    fn builder_fills_defaults() {
        let msg = MessageBuilder::new("trip_created", v1())
            .publisher("trip-service")
            .data(serde_json::json!({"trip_id": "abc"}))
            .build()
            .unwrap();
        assert!(!msg.id.is_empty());
        assert!(msg.timestamp > 0);
        assert_eq!(msg.publisher, "trip-service");
        assert_eq!(msg.provider_metadata, ProviderMetadata::None);
    }

    #[test]
    fn builder_rejects_reserved_header() {
        let result = MessageBuilder::new("trip_created", v1())
            .publisher("trip-service")
            .header("hedwig_id", "spoofed")
            .build();
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code, ErrorCode::ValidationReservedHeader);
    }

    #[test]
    fn with_headers_does_not_mutate_original() {
        let original = MessageBuilder::new("trip_created", v1())
            .publisher("trip-service")
            .header("region", "us-east-1")
            .build()
            .unwrap();
        let mut new_headers = Headers::new();
        new_headers.insert("region".to_string(), "eu-west-1".to_string());
        let updated = original.with_headers(new_headers);

        assert_eq!(original.headers.get("region").unwrap(), "us-east-1");
        assert_eq!(updated.headers.get("region").unwrap(), "eu-west-1");
    }

    #[test]
    fn headers_preserve_insertion_order() {
        let msg = MessageBuilder::new("trip_created", v1())
            .publisher("trip-service")
            .header("z_first", "1")
            .header("a_second", "2")
            .build()
            .unwrap();
        let keys: Vec<&str> = msg.headers.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z_first", "a_second"]);
    }

    #[test]
    fn provider_metadata_round_trips_through_json() {
        let meta = ProviderMetadata::Redis {
            stream: "trips".into(),
            entry_id: "1691020800000-0".into(),
            delivery_attempt: 2,
        };
        let json = serde_json::to_value(&meta).unwrap();
        let back: ProviderMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(meta, back);
    }

    #[test]
    fn validate_rejects_zero_timestamp() {
        let msg = Message {
            id: "id".into(),
            message_type: "trip_created".into(),
            version: v1(),
            timestamp: 0,
            publisher: "trip-service".into(),
            headers: Headers::new(),
            data: serde_json::Value::Null,
            provider_metadata: ProviderMetadata::None,
        };
        assert!(msg.validate().is_err());
    }
}
