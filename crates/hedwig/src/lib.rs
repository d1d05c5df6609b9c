//! hedwig
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Facade crate: wires a resolved [`HedwigFileConfig`], a routing table, and
//! a [`CallbackRegistry`] onto one of the three transport backends, and
//! re-exports the public surface an application actually needs so it can
//! depend on a single crate.

/// Turns config + transport-specific extras into backend trait objects.
pub mod wiring;

pub use hedwig_backend_gcp::SubscriptionRoute;
pub use hedwig_config::{AwsBackendConfig, BackendKind, GcpBackendConfig, HedwigFileConfig, RedisBackendConfig, ValidatorSettings};
pub use hedwig_consumer::CancellationToken;
pub use hedwig_core::{Headers, Message, MessageBuilder, MessageTypeRoute, MessageVersion, ProviderMetadata, TopicDescriptor};
pub use hedwig_error::{ErrorCategory, ErrorCode, HedwigError};
pub use hedwig_publisher::{HeaderHook, RetryBehavior};
pub use hedwig_retry::RetryPolicy;
pub use hedwig_validate::{FramingMode, SchemaRegistry, Validator};
pub use wiring::{BackendHandles, BackendWiring};

use std::collections::BTreeMap;
use std::sync::Arc;

use hedwig_backend_core::ConsumeBackend;
use hedwig_callback::{CallbackFn, CallbackRegistry};
use hedwig_consumer::Consumer;
use hedwig_publisher::Publisher;

/// A fully wired publisher/consumer pair over one transport, plus the
/// routing table used to resolve a message's destination topic.
pub struct Hedwig {
    /// Publisher core, ready to serialize and publish messages.
    pub publisher: Arc<Publisher>,
    /// Consumer core, present for every backend except [`BackendKind::Mock`].
    pub consumer: Option<Arc<Consumer>>,
    /// The raw consume backend, for operations the consumer loop itself
    /// doesn't need, like draining the dead-letter queue.
    consume_backend: Option<Arc<dyn ConsumeBackend>>,
    /// Shared callback registry, also reachable through `consumer`.
    pub callbacks: Arc<CallbackRegistry>,
    routes: BTreeMap<MessageTypeRoute, TopicDescriptor>,
}

impl Hedwig {
    /// Start building a facade over `config` and `validator`.
    #[must_use]
    pub fn builder(config: HedwigFileConfig, validator: Arc<Validator>) -> HedwigBuilder {
        HedwigBuilder::new(config, validator)
    }

    /// Resolve the topic a `(message_type, major)` route publishes to.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if no route was registered for this message
    /// type and major version.
    pub fn topic_for(&self, message_type: &str, major: u32) -> Result<&TopicDescriptor, HedwigError> {
        let route = MessageTypeRoute::new(message_type, major);
        self.routes
            .get(&route)
            .ok_or_else(|| HedwigError::new(ErrorCode::ConfigInvalid, format!("no topic registered for route '{route}'")))
    }

    /// Serialize and publish `message`, resolving its destination topic from
    /// the routing table rather than requiring the caller to pass one.
    pub async fn publish(&self, message: Message) -> Result<String, HedwigError> {
        let topic = self.topic_for(&message.message_type, message.version.major)?.clone();
        self.publisher.publish(message, &topic).await
    }

    /// Run the consumer's fetch-and-process loop until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if this facade has no consume backend (the
    /// [`BackendKind::Mock`] case), or propagates a backend `pull` error.
    pub async fn run_consumer(&self, num_messages: u32, visibility_timeout_secs: u64, shutdown: &CancellationToken) -> Result<(), HedwigError> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| HedwigError::new(ErrorCode::ConfigInvalid, "this backend has no consume side"))?;
        consumer.fetch_and_process(num_messages, visibility_timeout_secs, shutdown).await
    }

    /// Drain the dead-letter queue/subscription back onto the main transport.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if this facade has no consume backend.
    pub async fn requeue_dead_letter(&self, num_messages: u32, visibility_timeout_secs: u64) -> Result<u32, HedwigError> {
        let backend = self
            .consume_backend
            .as_ref()
            .ok_or_else(|| HedwigError::new(ErrorCode::ConfigInvalid, "this backend has no consume side"))?;
        backend.requeue_dead_letter(num_messages, visibility_timeout_secs).await
    }
}

/// Builds a [`Hedwig`] facade: routing table entries and callbacks accrue on
/// the builder, then [`HedwigBuilder::build`] wires everything onto a
/// concrete transport.
pub struct HedwigBuilder {
    config: HedwigFileConfig,
    validator: Arc<Validator>,
    callbacks: CallbackRegistry,
    routes: BTreeMap<MessageTypeRoute, TopicDescriptor>,
    retry_policy: RetryPolicy,
    default_headers_hook: Option<HeaderHook>,
    tracing_inject_hook: Option<HeaderHook>,
    inactivity_reset: Option<std::time::Duration>,
}

impl HedwigBuilder {
    /// Start from a resolved config and validator, with no routes or
    /// callbacks registered yet.
    #[must_use]
    pub fn new(config: HedwigFileConfig, validator: Arc<Validator>) -> Self {
        Self {
            config,
            validator,
            callbacks: CallbackRegistry::new(),
            routes: BTreeMap::new(),
            retry_policy: RetryPolicy::default(),
            default_headers_hook: None,
            tracing_inject_hook: None,
            inactivity_reset: None,
        }
    }

    /// Register the destination topic for a `(message_type, major)` route.
    #[must_use]
    pub fn with_route(mut self, message_type: impl Into<String>, major: u32, topic: TopicDescriptor) -> Self {
        self.routes.insert(MessageTypeRoute::new(message_type, major), topic);
        self
    }

    /// Register a callback for `(message_type, major.*)`.
    ///
    /// # Errors
    ///
    /// Returns `CallbackConflict` if this route already has a handler.
    pub fn with_callback(mut self, message_type: impl Into<String>, major: u32, callback: CallbackFn) -> Result<Self, HedwigError> {
        self.callbacks.register(message_type, major, callback)?;
        Ok(self)
    }

    /// Override the retry policy used for SNS/Pub-Sub publishes.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Register a default-headers hook (spec §4.2 step 2).
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

    /// Reset the consumer's rolling error counter after this much inactivity.
    #[must_use]
    pub fn with_inactivity_reset(mut self, after: std::time::Duration) -> Self {
        self.inactivity_reset = Some(after);
        self
    }

    /// Run the startup schema sanity check, wire the configured backend, and
    /// produce a [`Hedwig`] facade.
    ///
    /// # Errors
    ///
    /// Propagates `wiring::build`'s connection errors, or `SchemaMissingForRoute`
    /// if a registered route has no corresponding schema.
    pub async fn build(self, backend_wiring: BackendWiring) -> Result<Hedwig, HedwigError> {
        self.validator.check_sanity(self.routes.keys().cloned())?;

        let handles = wiring::build(&self.config, backend_wiring).await?;
        let callbacks = Arc::new(self.callbacks);

        let mut publisher = Publisher::new(self.validator.clone(), handles.publish);
        if let Some(hook) = self.default_headers_hook {
            publisher = publisher.with_default_headers_hook(hook);
        }
        if let Some(hook) = self.tracing_inject_hook {
            publisher = publisher.with_tracing_inject_hook(hook);
        }
        let retry_behavior = match self.config.backend {
            BackendKind::Sqs | BackendKind::GooglePubSub => RetryBehavior::Wrapped,
            BackendKind::Mock | BackendKind::Redis => RetryBehavior::Direct,
        };
        publisher = publisher.with_retry(retry_behavior, self.retry_policy, hedwig_publisher::default_retryable);
        if matches!(self.config.backend, BackendKind::Mock) {
            publisher = publisher.with_sync_registry(callbacks.clone());
        }

        let consume_backend = handles.consume;
        let consumer = consume_backend.clone().map(|backend| {
            let mut consumer = Consumer::new(self.validator, backend, callbacks.clone());
            if let Some(after) = self.inactivity_reset {
                consumer = consumer.with_inactivity_reset(after);
            }
            Arc::new(consumer)
        });

        tracing::info!(
            target: "hedwig.facade",
            backend = ?self.config.backend,
            queue = %self.config.queue,
            routes = self.routes.len(),
            "hedwig facade wired"
        );

        Ok(Hedwig {
            publisher: Arc::new(publisher),
            consumer,
            consume_backend,
            callbacks,
            routes: self.routes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hedwig_validate::{JsonSchemaRegistry, SchemaRegistry};

    fn validator() -> Arc<Validator> {
        let mut registry = JsonSchemaRegistry::new("https://hedwig.example/schema.json");
        registry.register("trip_created", 1, 0, &serde_json::json!({"type": "object"})).unwrap();
        Arc::new(Validator::new(
            SchemaRegistry::JsonSchema(registry),
            Some("https://hedwig.example/schema.json".to_string()),
            FramingMode::Attributes,
        ))
    }

    #[tokio::test]
    async fn mock_backend_builds_with_sync_publish_and_no_consumer() {
        let config = HedwigFileConfig {
            backend: BackendKind::Mock,
            ..HedwigFileConfig::default()
        };
        let hedwig = HedwigBuilder::new(config, validator())
            .with_route("trip_created", 1, TopicDescriptor::Bare { topic: "trips".into() })
            .with_callback("trip_created", 1, Arc::new(|_msg| Box::pin(async { Ok(()) })))
            .unwrap()
            .build(BackendWiring::Mock)
            .await
            .unwrap();

        assert!(hedwig.consumer.is_none());
        let message = MessageBuilder::new("trip_created", MessageVersion::new(1, 0).unwrap())
            .publisher("trip-service")
            .data(serde_json::json!({"trip_id": "abc"}))
            .build()
            .unwrap();
        let id = hedwig.publish(message).await.unwrap();
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn publish_without_a_registered_route_fails_with_config_invalid() {
        let config = HedwigFileConfig {
            backend: BackendKind::Mock,
            ..HedwigFileConfig::default()
        };
        let hedwig = HedwigBuilder::new(config, validator()).build(BackendWiring::Mock).await.unwrap();
        let message = MessageBuilder::new("trip_created", MessageVersion::new(1, 0).unwrap())
            .publisher("trip-service")
            .data(serde_json::json!({"trip_id": "abc"}))
            .build()
            .unwrap();
        let err = hedwig.publish(message).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalid);
    }

    #[tokio::test]
    async fn run_consumer_without_a_consume_backend_fails_with_config_invalid() {
        let config = HedwigFileConfig {
            backend: BackendKind::Mock,
            ..HedwigFileConfig::default()
        };
        let hedwig = HedwigBuilder::new(config, validator()).build(BackendWiring::Mock).await.unwrap();
        let shutdown = CancellationToken::new();
        let err = hedwig.run_consumer(10, 30, &shutdown).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalid);
    }
}
