// SPDX-License-Identifier: MIT OR Apache-2.0
//! hedwig-consumer
//!
//! Consumer core (spec §4.3): a backend-agnostic `fetch_and_process` loop
//! that pulls raw entries, decodes them through `hedwig-validate`, dispatches
//! to a registered callback, and acks or nacks according to the error
//! taxonomy in spec §7.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Lifecycle hooks for pre-process, post-process, and heartbeat extension
/// points.
pub mod hooks;
/// Observability primitives: tracing spans and a consumer-loop observer.
pub mod observe;
/// Telemetry and the rolling error counter.
pub mod telemetry;

pub use hedwig_backend_core::CancellationToken;

use std::sync::Arc;
use std::time::{Duration, Instant};

use hedwig_backend_core::{entry_as_encoded, with_provider_metadata, ConsumeBackend, RawEntry};
use hedwig_callback::{CallbackFailure, CallbackRegistry};
use hedwig_error::HedwigError;
use hedwig_validate::{EncodedMessage, FramingMode, Validator};
use hooks::HookRegistry;
use telemetry::RunMetrics;

/// Disposition of a single entry after error-taxonomy dispatch (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Ack,
    Nack {
        /// Whether this nack should increment the rolling error counter.
        /// Only uncaught callback exceptions count (spec §7, §8 invariant 7).
        counts_as_error: bool,
    },
}

/// Runs the fetch-and-process loop against one backend, validator, and
/// callback registry.
pub struct Consumer {
    validator: Arc<Validator>,
    backend: Arc<dyn ConsumeBackend>,
    callbacks: Arc<CallbackRegistry>,
    hooks: HookRegistry,
    metrics: Arc<RunMetrics>,
    /// After this much time with no messages pulled, reset the rolling
    /// error counter even without a successful callback (spec §4.3's
    /// inactivity timer).
    inactivity_reset: Option<Duration>,
}

impl Consumer {
    /// Build a consumer over the given validator, backend, and callback
    /// registry. No hooks are registered and no inactivity reset is
    /// configured by default.
    pub fn new(validator: Arc<Validator>, backend: Arc<dyn ConsumeBackend>, callbacks: Arc<CallbackRegistry>) -> Self {
        Self {
            validator,
            backend,
            callbacks,
            hooks: HookRegistry::new(),
            metrics: Arc::new(RunMetrics::new()),
            inactivity_reset: None,
        }
    }

    /// Replace the hook registry.
    #[must_use]
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Reset the rolling error counter after `after` elapses with no
    /// messages pulled.
    #[must_use]
    pub fn with_inactivity_reset(mut self, after: Duration) -> Self {
        self.inactivity_reset = Some(after);
        self
    }

    /// Shared handle to this consumer's metrics, for external inspection or
    /// wiring into a [`hooks::MetricsHook`].
    #[must_use]
    pub fn metrics(&self) -> Arc<RunMetrics> {
        self.metrics.clone()
    }

    /// Run the long-lived fetch-and-process loop (spec §4.3) until
    /// `shutdown` is observed.
    ///
    /// Each iteration pulls up to `num_messages` entries with
    /// `visibility_timeout_secs`, processes them one at a time, then fires
    /// the heartbeat hook with the current rolling error count. Returns once
    /// `shutdown.is_cancelled()` is true at the top of an iteration —
    /// matching spec §8 invariant 8's "returns within one pull interval, no
    /// further pulls occur".
    ///
    /// # Errors
    ///
    /// Propagates a `pull` error from the backend (e.g. a transport
    /// connectivity failure); per-entry processing errors are handled
    /// internally via ack/nack and never abort the loop.
    pub async fn fetch_and_process(
        &self,
        num_messages: u32,
        visibility_timeout_secs: u64,
        shutdown: &CancellationToken,
    ) -> Result<(), HedwigError> {
        let mut last_message_at = Instant::now();

        while !shutdown.is_cancelled() {
            let entries = self.backend.pull(num_messages, visibility_timeout_secs, shutdown).await?;

            if entries.is_empty() {
                if let Some(reset_after) = self.inactivity_reset {
                    if last_message_at.elapsed() >= reset_after {
                        self.metrics.reset_error_count();
                    }
                }
            } else {
                last_message_at = Instant::now();
            }

            for entry in entries {
                self.process_entry(entry).await;
            }

            let error_count = self.metrics.error_count();
            self.hooks.fire_heartbeat(error_count);
        }

        tracing::info!(target: "hedwig.consumer", "shutdown observed, exiting fetch_and_process");
        Ok(())
    }

    async fn process_entry(&self, entry: RawEntry) {
        let span = tracing::info_span!("hedwig.consumer.receive", message_type = tracing::field::Empty);
        let _guard = span.enter();

        let pre_kwargs = self.backend.pre_process_hook_kwargs(&entry);
        if let Err(err) = self.hooks.fire_pre_process(&pre_kwargs) {
            tracing::error!(error = %err, "pre-process hook failed, nacking");
            self.safe_nack(&entry).await;
            self.metrics.record_nack(false);
            return;
        }

        match self.build_and_dispatch(&entry, &span).await {
            Disposition::Ack => {
                let post_kwargs = self.backend.post_process_hook_kwargs(&entry);
                if let Err(err) = self.hooks.fire_post_process(&post_kwargs) {
                    tracing::error!(error = %err, "post-process hook failed, nacking");
                    self.safe_nack(&entry).await;
                    self.metrics.record_nack(false);
                    return;
                }
                if let Err(err) = self.backend.ack(&entry).await {
                    tracing::warn!(error = %err, "ack failed, relying on transport redelivery");
                }
                self.metrics.record_success();
            }
            Disposition::Nack { counts_as_error } => {
                self.safe_nack(&entry).await;
                self.metrics.record_nack(counts_as_error);
            }
        }
    }

    async fn safe_nack(&self, entry: &RawEntry) {
        if let Err(err) = self.backend.nack(entry).await {
            tracing::warn!(error = %err, "nack failed");
        }
    }

    async fn build_and_dispatch(&self, entry: &RawEntry, span: &tracing::Span) -> Disposition {
        let (payload, attributes) = entry_as_encoded(entry);

        let payload_str = match String::from_utf8(payload) {
            Ok(s) => s,
            Err(_) => {
                tracing::error!("entry payload is not valid utf-8, nacking");
                return Disposition::Nack { counts_as_error: false };
            }
        };

        let encoded = match self.validator.framing() {
            FramingMode::Container => EncodedMessage::Container { body: payload_str },
            FramingMode::Attributes => EncodedMessage::Attributes { payload: payload_str, attributes },
        };

        let message = match self.validator.deserialize(&encoded) {
            Ok(message) => with_provider_metadata(message, entry),
            Err(err) => {
                tracing::error!(code = ?err.code, message = %err.message, "validation error, nacking");
                return Disposition::Nack { counts_as_error: false };
            }
        };

        span.record("message_type", message.message_type.as_str());

        let callback = match self.callbacks.find_by_message(&message.message_type, message.version.major) {
            Ok(callback) => callback.clone(),
            Err(err) => {
                // CallbackNotFound is treated identically to ValidationError (spec §4.5, §7).
                tracing::error!(code = ?err.code, "no callback registered for message type, nacking");
                return Disposition::Nack { counts_as_error: false };
            }
        };

        match callback(message).await {
            Ok(()) => Disposition::Ack,
            Err(CallbackFailure::Ignore) => {
                tracing::info!("callback signalled ignore, acking");
                Disposition::Ack
            }
            Err(CallbackFailure::Logging { extra }) => {
                tracing::error!(?extra, "callback signalled an expected failure, nacking");
                Disposition::Nack { counts_as_error: false }
            }
            Err(CallbackFailure::Retry) => {
                tracing::info!("callback signalled retry, nacking without stack trace");
                Disposition::Nack { counts_as_error: false }
            }
            Err(CallbackFailure::Other(err)) => {
                tracing::error!(error = %err, "callback raised an uncaught error, nacking");
                Disposition::Nack { counts_as_error: true }
            }
        }
    }
}
