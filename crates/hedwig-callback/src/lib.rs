//! hedwig-callback
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The callback registry (spec §4.5): a map from `(type, major.*)` to a
//! handler closure, resolved once at startup rather than from dotted-path
//! strings — there is no dynamic import mechanism in Rust, so the
//! "signature validation at registration" invariant becomes a type-system
//! guarantee instead of a runtime check.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hedwig_core::{Message, MessageTypeRoute};
use hedwig_error::{ErrorCode, HedwigError};

/// A boxed, `Send`, `'static` future — the shape every callback must return.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Disposition a callback (or a pre/post hook) can signal back to the
/// consumer loop, mirroring spec §7's exception taxonomy. Carried as the
/// `Err` variant of a callback's `Result` rather than modeled as success,
/// since "ignore" and "retry" are still non-default outcomes a handler must
/// explicitly choose.
pub enum CallbackFailure {
    /// Silently drop this entry; the loop acks it as if it had succeeded.
    Ignore,
    /// Expected failure; record `extra` as structured context and nack.
    Logging {
        /// Structured context attached to the resulting log record.
        extra: BTreeMap<String, serde_json::Value>,
    },
    /// Transient failure; nack without logging a stack trace.
    Retry,
    /// Programmer error or third-party failure; nack, log with a stack
    /// trace, and increment the consumer's error counter.
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl std::fmt::Debug for CallbackFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ignore => write!(f, "Ignore"),
            Self::Logging { extra } => f.debug_struct("Logging").field("extra", extra).finish(),
            Self::Retry => write!(f, "Retry"),
            Self::Other(e) => write!(f, "Other({e})"),
        }
    }
}

/// A registered message handler.
pub type CallbackFn = Arc<dyn Fn(Message) -> BoxFuture<'static, Result<(), CallbackFailure>> + Send + Sync>;

/// Maps `(type, major.*)` routes to handler closures.
///
/// Construct once at startup and treat as read-only thereafter, matching
/// spec §9's "global settings ... initialized-once, read-only record".
#[derive(Default)]
pub struct CallbackRegistry {
    entries: BTreeMap<MessageTypeRoute, CallbackFn>,
}

impl CallbackRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `(message_type, major.*)`.
    ///
    /// # Errors
    ///
    /// Returns `CallbackConflict` if this route already has a registered
    /// handler — spec §4.5's "the registry is thereafter a plain map",
    /// which only holds if each key is written once.
    pub fn register(
        &mut self,
        message_type: impl Into<String>,
        major: u32,
        callback: CallbackFn,
    ) -> Result<(), HedwigError> {
        let route = MessageTypeRoute::new(message_type, major);
        if self.entries.contains_key(&route) {
            return Err(HedwigError::new(
                ErrorCode::CallbackConflict,
                format!("'{route}' already has a registered callback"),
            ));
        }
        self.entries.insert(route, callback);
        Ok(())
    }

    /// Look up the handler for `(message_type, major)`.
    ///
    /// # Errors
    ///
    /// Returns `CallbackNotFound` if no handler is registered for the
    /// route. Per spec §4.5, the consumer loop treats this identically to
    /// a `ValidationError` when processing a live message.
    pub fn find_by_message(&self, message_type: &str, major: u32) -> Result<&CallbackFn, HedwigError> {
        let route = MessageTypeRoute::new(message_type, major);
        self.entries.get(&route).ok_or_else(|| {
            HedwigError::new(ErrorCode::CallbackNotFound, format!("no callback registered for '{route}'"))
        })
    }

    /// All routes this registry has a handler for.
    pub fn routes(&self) -> impl Iterator<Item = &MessageTypeRoute> {
        self.entries.keys()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hedwig_core::MessageVersion;

    fn sample_message() -> Message {
        hedwig_core::MessageBuilder::new("trip_created", MessageVersion::new(1, 0).unwrap())
            .publisher("trip-service")
            .data(serde_json::json!({"trip_id": "abc"}))
            .build()
            .unwrap()
    }

    fn noop_callback() -> CallbackFn {
        Arc::new(|_msg| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn register_and_find_round_trip() {
        let mut registry = CallbackRegistry::new();
        registry.register("trip_created", 1, noop_callback()).unwrap();
        assert!(registry.find_by_message("trip_created", 1).is_ok());
    }

    #[test]
    fn find_unregistered_route_fails_with_callback_not_found() {
        let registry = CallbackRegistry::new();
        let err = registry.find_by_message("trip_created", 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::CallbackNotFound);
    }

    #[test]
    fn double_registration_is_a_conflict() {
        let mut registry = CallbackRegistry::new();
        registry.register("trip_created", 1, noop_callback()).unwrap();
        let err = registry.register("trip_created", 1, noop_callback()).unwrap_err();
        assert_eq!(err.code, ErrorCode::CallbackConflict);
    }

    #[test]
    fn different_major_versions_are_independent_routes() {
        let mut registry = CallbackRegistry::new();
        registry.register("trip_created", 1, noop_callback()).unwrap();
        registry.register("trip_created", 2, noop_callback()).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn registered_callback_is_invocable_with_a_message() {
        let mut registry = CallbackRegistry::new();
        registry.register("trip_created", 1, noop_callback()).unwrap();
        let callback = registry.find_by_message("trip_created", 1).unwrap().clone();
        let result = callback(sample_message()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn callback_can_signal_ignore_logging_and_retry() {
        let ignore_cb: CallbackFn = Arc::new(|_| Box::pin(async { Err(CallbackFailure::Ignore) }));
        let logging_cb: CallbackFn = Arc::new(|_| {
            Box::pin(async {
                let mut extra = BTreeMap::new();
                extra.insert("reason".to_string(), serde_json::json!("expected"));
                Err(CallbackFailure::Logging { extra })
            })
        });
        let retry_cb: CallbackFn = Arc::new(|_| Box::pin(async { Err(CallbackFailure::Retry) }));

        assert!(matches!(ignore_cb(sample_message()).await, Err(CallbackFailure::Ignore)));
        assert!(matches!(logging_cb(sample_message()).await, Err(CallbackFailure::Logging { .. })));
        assert!(matches!(retry_cb(sample_message()).await, Err(CallbackFailure::Retry)));
    }
}
