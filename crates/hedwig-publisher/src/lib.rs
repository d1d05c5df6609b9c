//! hedwig-publisher
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Publisher core (spec §4.2): header hooks, serialization through
//! `hedwig-validate`, and transport publish through a
//! [`hedwig_backend_core::PublishBackend`], with SNS/Pub-Sub-style publishes
//! wrapped in `hedwig-retry`'s bounded backoff.

use std::collections::BTreeMap;
use std::sync::Arc;

use hedwig_backend_core::PublishBackend;
use hedwig_callback::CallbackRegistry;
use hedwig_core::{Headers, Message, TopicDescriptor};
use hedwig_error::{ErrorCode, HedwigError};
use hedwig_retry::RetryPolicy;
use hedwig_validate::{EncodedMessage, Validator};

/// A hook producing headers to merge into every outgoing message, e.g.
/// default headers or tracing-propagation headers (spec §4.2 steps 2-3).
pub type HeaderHook = Arc<dyn Fn() -> Headers + Send + Sync>;

/// Whether a backend's publish call should be retried on transient failure.
///
/// Per spec §7, only SNS and Pub/Sub publishes are wrapped in bounded
/// retry; a publisher built for SQS or Redis should use
/// [`RetryBehavior::Direct`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBehavior {
    /// Call the backend directly; transport SDK semantics apply as-is.
    Direct,
    /// Wrap the publish call in `hedwig-retry`'s bounded backoff.
    Wrapped,
}

/// Classifies whether a publish failure is worth retrying. Transport crates
/// supply their own; the default treats every `BackendTimeout` and
/// `BackendTransportFailed` as retryable.
pub fn default_retryable(err: &HedwigError) -> bool {
    matches!(err.code, ErrorCode::BackendTimeout | ErrorCode::BackendTransportFailed)
}

/// Publisher core: applies header hooks, serializes via a [`Validator`],
/// and publishes through a [`PublishBackend`].
pub struct Publisher {
    validator: Arc<Validator>,
    backend: Arc<dyn PublishBackend>,
    default_headers_hook: Option<HeaderHook>,
    tracing_inject_hook: Option<HeaderHook>,
    retry_behavior: RetryBehavior,
    retry_policy: RetryPolicy,
    retryable: fn(&HedwigError) -> bool,
    /// When set, `publish` runs in-process against this registry instead of
    /// calling the backend at all (spec §4.2 step 1, sync mode).
    sync_registry: Option<Arc<CallbackRegistry>>,
}

impl Publisher {
    /// Start building a publisher over the given validator and backend.
    pub fn new(validator: Arc<Validator>, backend: Arc<dyn PublishBackend>) -> Self {
        Self {
            validator,
            backend,
            default_headers_hook: None,
            tracing_inject_hook: None,
            retry_behavior: RetryBehavior::Direct,
            retry_policy: RetryPolicy::default(),
            retryable: default_retryable,
            sync_registry: None,
        }
    }

    /// Register a default-headers hook (spec §4.2 step 2). User-supplied
    /// headers always win on key conflict.
    #[must_use]
    pub fn with_default_headers_hook(mut self, hook: HeaderHook) -> Self {
        self.default_headers_hook = Some(hook);
        self
    }

    /// Register a tracing-inject hook (spec §4.2 step 3).
    #[must_use]
    pub fn with_tracing_inject_hook(mut self, hook: HeaderHook) -> Self {
        self.tracing_inject_hook = Some(hook);
        self
    }

    /// Wrap transport publish calls in bounded retry/backoff, matching
    /// spec §7's SNS/Pub-Sub behavior. Call with `RetryBehavior::Direct`
    /// (the default) for SQS/Redis-style publishers.
    #[must_use]
    pub fn with_retry(mut self, behavior: RetryBehavior, policy: RetryPolicy, retryable: fn(&HedwigError) -> bool) -> Self {
        self.retry_behavior = behavior;
        self.retry_policy = policy;
        self.retryable = retryable;
        self
    }

    /// Run in-process `publisher_enabled_sync` mode (spec §4.2 step 1):
    /// publish calls invoke the matching callback directly instead of
    /// reaching the transport, returning a freshly generated id.
    #[must_use]
    pub fn with_sync_registry(mut self, registry: Arc<CallbackRegistry>) -> Self {
        self.sync_registry = Some(registry);
        self
    }

    /// Publish `message` to `topic`, returning the transport-assigned
    /// (or freshly generated, in sync mode) message id.
    pub async fn publish(&self, mut message: Message, topic: &TopicDescriptor) -> Result<String, HedwigError> {
        if let Some(registry) = &self.sync_registry {
            return self.publish_sync(message, registry).await;
        }

        if let Some(hook) = &self.default_headers_hook {
            let mut merged = hook();
            for (k, v) in &message.headers {
                merged.insert(k.clone(), v.clone());
            }
            message = message.with_headers(merged);
        }

        if let Some(hook) = &self.tracing_inject_hook {
            let mut merged = message.headers.clone();
            for (k, v) in hook() {
                merged.insert(k, v);
            }
            message = message.with_headers(merged);
        }

        let encoded = self.validator.serialize(&message)?;
        let (payload, attributes) = split_encoded(encoded);

        let id = match self.retry_behavior {
            RetryBehavior::Direct => self.backend.publish(topic, payload, attributes).await?,
            RetryBehavior::Wrapped => {
                hedwig_retry::retry(
                    &self.retry_policy,
                    || self.backend.publish(topic, payload.clone(), attributes.clone()),
                    self.retryable,
                )
                .await?
            }
        };

        tracing::info!(
            target: "hedwig.publisher",
            message_id = %message.id,
            message_type = %message.message_type,
            topic = topic.topic(),
            transport_id = %id,
            "message published"
        );
        Ok(id)
    }

    async fn publish_sync(&self, message: Message, registry: &CallbackRegistry) -> Result<String, HedwigError> {
        let id = uuid::Uuid::new_v4().to_string();
        let callback = registry
            .find_by_message(&message.message_type, message.version.major)
            .map_err(|err| {
                HedwigError::new(ErrorCode::ValidationUnknownType, err.message.clone())
                    .with_context("message_type", message.message_type.clone())
            })?
            .clone();
        if let Err(failure) = callback(message).await {
            tracing::warn!(target: "hedwig.publisher", "sync-mode callback did not succeed: {failure:?}");
        }
        Ok(id)
    }
}

fn split_encoded(encoded: EncodedMessage) -> (Vec<u8>, BTreeMap<String, String>) {
    match encoded {
        EncodedMessage::Container { body } => (body.into_bytes(), BTreeMap::new()),
        EncodedMessage::Attributes { payload, attributes } => (payload.into_bytes(), attributes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hedwig_backend_mock::{CapturingBackend, MockBackend};
    use hedwig_core::{MessageBuilder, MessageVersion};
    use hedwig_validate::{FramingMode, JsonSchemaRegistry, SchemaRegistry};

    fn validator() -> Arc<Validator> {
        let mut registry = JsonSchemaRegistry::new("https://hedwig.example/schema.json");
        registry
            .register("trip_created", 1, 0, &serde_json::json!({"type": "object"}))
            .unwrap();
        Arc::new(Validator::new(SchemaRegistry::JsonSchema(registry), Some("https://hedwig.example/schema.json".to_string()), FramingMode::Attributes))
    }

    fn sample_message() -> Message {
        MessageBuilder::new("trip_created", MessageVersion::new(1, 0).unwrap())
            .publisher("trip-service")
            .data(serde_json::json!({"trip_id": "abc"}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn publish_reaches_the_backend_and_returns_an_id() {
        let backend = Arc::new(CapturingBackend::new());
        let publisher = Publisher::new(validator(), backend.clone());
        let topic = TopicDescriptor::Bare { topic: "trips".into() };
        let id = publisher.publish(sample_message(), &topic).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn default_headers_hook_does_not_override_user_headers() {
        let backend = Arc::new(CapturingBackend::new());
        let hook: HeaderHook = Arc::new(|| {
            let mut h = Headers::new();
            h.insert("region".to_string(), "default-region".to_string());
            h
        });
        let publisher = Publisher::new(validator(), backend.clone()).with_default_headers_hook(hook);
        let msg = MessageBuilder::new("trip_created", MessageVersion::new(1, 0).unwrap())
            .publisher("trip-service")
            .header("region", "us-east-1")
            .data(serde_json::json!({"trip_id": "abc"}))
            .build()
            .unwrap();
        let topic = TopicDescriptor::Bare { topic: "trips".into() };
        publisher.publish(msg, &topic).await.unwrap();
        let published = backend.published();
        assert_eq!(published[0].attributes.get("region").unwrap(), "us-east-1");
    }

    #[tokio::test]
    async fn sync_mode_invokes_callback_instead_of_backend() {
        let mut registry = CallbackRegistry::new();
        let invoked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = invoked.clone();
        registry
            .register(
                "trip_created",
                1,
                Arc::new(move |_msg| {
                    let flag = flag.clone();
                    Box::pin(async move {
                        flag.store(true, std::sync::atomic::Ordering::SeqCst);
                        Ok(())
                    })
                }),
            )
            .unwrap();
        let backend = Arc::new(CapturingBackend::new());
        let publisher = Publisher::new(validator(), backend.clone()).with_sync_registry(Arc::new(registry));
        let topic = TopicDescriptor::Bare { topic: "trips".into() };
        let id = publisher.publish(sample_message(), &topic).await.unwrap();
        assert!(!id.is_empty());
        assert!(invoked.load(std::sync::atomic::Ordering::SeqCst));
        assert!(backend.is_empty(), "sync mode must not reach the transport");
    }

    #[tokio::test]
    async fn mock_backend_accepts_container_mode_publish() {
        let mut registry = JsonSchemaRegistry::new("https://hedwig.example/schema.json");
        registry
            .register("trip_created", 1, 0, &serde_json::json!({"type": "object"}))
            .unwrap();
        let validator = Arc::new(Validator::new(
            SchemaRegistry::JsonSchema(registry),
            Some("https://hedwig.example/schema.json".to_string()),
            FramingMode::Container,
        ));
        let backend = Arc::new(MockBackend::new());
        let publisher = Publisher::new(validator, backend);
        let topic = TopicDescriptor::Bare { topic: "trips".into() };
        let id = publisher.publish(sample_message(), &topic).await.unwrap();
        assert!(!id.is_empty());
    }
}
