//! hedwig-backend-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The uniform backend contract every transport (SQS/SNS, Pub/Sub, Redis
//! Streams, the in-process mock) implements. A backend is split into two
//! independent traits: [`PublishBackend`] for the publisher side and
//! [`ConsumeBackend`] for the consumer side, since not every deployment
//! needs both (a publish-only service never pulls).

use std::collections::BTreeMap;

use async_trait::async_trait;
use hedwig_core::{Message, ProviderMetadata, TopicDescriptor};
use hedwig_error::HedwigError;

/// Cancellation primitives for the consumer loop's shutdown-event polling
/// model (spec §5).
pub mod cancel;

pub use cancel::CancellationToken;

/// A single raw entry pulled from a transport, not yet run through the
/// validator.
///
/// `native` carries whatever transport-specific representation pre/post
/// process hooks need (e.g. the raw SQS message JSON); backends that have
/// nothing useful to expose there may leave it `Value::Null`.
#[derive(Debug, Clone)]
pub struct RawEntry {
    /// Raw payload bytes, exactly as received from the transport.
    pub payload: Vec<u8>,
    /// Transport attributes / message attributes, exactly as received.
    pub attributes: BTreeMap<String, String>,
    /// Transport-specific delivery metadata (receipt handle, ack id, ...).
    pub provider_metadata: ProviderMetadata,
    /// Opaque transport-native value surfaced to lifecycle hooks.
    pub native: serde_json::Value,
}

/// The publish-side half of the backend contract.
///
/// Every backend that can publish implements this independently of whether
/// it also consumes — the in-process mock backend used for
/// `publisher_enabled_sync` mode, for instance, only implements this trait.
#[async_trait]
pub trait PublishBackend: Send + Sync {
    /// Publish a single already-encoded message to `topic`, returning the
    /// transport-assigned message id.
    async fn publish(
        &self,
        topic: &TopicDescriptor,
        payload: Vec<u8>,
        attributes: BTreeMap<String, String>,
    ) -> Result<String, HedwigError>;
}

/// The consume-side half of the backend contract (spec §4.4).
#[async_trait]
pub trait ConsumeBackend: Send + Sync {
    /// Pull up to `num_messages` entries, leasing them for
    /// `visibility_timeout_secs`. Implementations poll cooperatively and
    /// should return promptly (an empty `Vec`) once `shutdown` is
    /// cancelled, rather than blocking indefinitely.
    async fn pull(
        &self,
        num_messages: u32,
        visibility_timeout_secs: u64,
        shutdown: &CancellationToken,
    ) -> Result<Vec<RawEntry>, HedwigError>;

    /// Acknowledge successful processing of `entry`, removing it from the
    /// queue/stream permanently.
    async fn ack(&self, entry: &RawEntry) -> Result<(), HedwigError>;

    /// Negatively acknowledge `entry`. Most transports treat this as a
    /// no-op (the message simply becomes visible again once its lease
    /// expires); Redis Streams is the same.
    async fn nack(&self, entry: &RawEntry) -> Result<(), HedwigError>;

    /// Extend the visibility/ack-deadline lease on `entry` by `seconds`.
    async fn extend_visibility_timeout(&self, entry: &RawEntry, seconds: u64) -> Result<(), HedwigError>;

    /// Move up to `num_messages` entries from the dead-letter queue back
    /// onto the main queue/topic/stream, returning how many were moved.
    async fn requeue_dead_letter(&self, num_messages: u32, visibility_timeout_secs: u64) -> Result<u32, HedwigError>;

    /// Transport-native key-value context exposed to the `pre_process`
    /// lifecycle hook. Defaults to the entry's `native` value.
    fn pre_process_hook_kwargs(&self, entry: &RawEntry) -> serde_json::Value {
        entry.native.clone()
    }

    /// Transport-native key-value context exposed to the `post_process`
    /// lifecycle hook. Defaults to the entry's `native` value.
    fn post_process_hook_kwargs(&self, entry: &RawEntry) -> serde_json::Value {
        entry.native.clone()
    }
}

/// Decode a raw entry's payload and attributes into the shape
/// `hedwig-validate`'s `Validator::deserialize` expects, without yet
/// running the schema check. Shared by every backend's `pull`
/// implementation so the decode step is identical regardless of transport.
pub fn entry_as_encoded(entry: &RawEntry) -> (Vec<u8>, BTreeMap<String, String>) {
    (entry.payload.clone(), entry.attributes.clone())
}

/// Attach this entry's provider metadata onto a deserialized [`Message`].
pub fn with_provider_metadata(message: Message, entry: &RawEntry) -> Message {
    message.with_provider_metadata(entry.provider_metadata.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_as_encoded_clones_payload_and_attributes() {
        let mut attrs = BTreeMap::new();
        attrs.insert("hedwig_id".to_string(), "abc".to_string());
        let entry = RawEntry {
            payload: b"hello".to_vec(),
            attributes: attrs.clone(),
            provider_metadata: ProviderMetadata::None,
            native: serde_json::Value::Null,
        };
        let (payload, attributes) = entry_as_encoded(&entry);
        assert_eq!(payload, b"hello");
        assert_eq!(attributes, attrs);
    }

    #[test]
    fn with_provider_metadata_attaches_to_message() {
        let msg = hedwig_core::MessageBuilder::new("trip_created", hedwig_core::MessageVersion::new(1, 0).unwrap())
            .publisher("trip-service")
            .data(serde_json::json!({}))
            .build()
            .unwrap();
        let entry = RawEntry {
            payload: vec![],
            attributes: BTreeMap::new(),
            provider_metadata: ProviderMetadata::Redis {
                stream: "hedwig:trips".into(),
                entry_id: "1-0".into(),
                delivery_attempt: 1,
            },
            native: serde_json::Value::Null,
        };
        let attached = with_provider_metadata(msg, &entry);
        assert_eq!(attached.provider_metadata, entry.provider_metadata);
    }
}
