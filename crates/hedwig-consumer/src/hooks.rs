// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lifecycle hooks for consumer-loop extensibility (spec §4.3).
//!
//! Register [`ConsumerHook`] implementations with a [`HookRegistry`] to
//! observe and react to pre-process, post-process, and heartbeat moments
//! without modifying the core fetch-and-process loop.

use std::sync::Arc;

use crate::telemetry::RunMetrics;

/// Extension point called at well-defined moments around processing one
/// pulled entry.
///
/// All methods have default no-op implementations so hooks only need to
/// override the callbacks they care about.
pub trait ConsumerHook: Send + Sync {
    /// Called before the entry is decoded into a `Message`. `kwargs` is the
    /// backend's transport-native context for this entry
    /// (`hedwig_backend_core::ConsumeBackend::pre_process_hook_kwargs`).
    ///
    /// # Errors
    ///
    /// Per spec §4.3 step 2, an error here causes the entry to be nacked
    /// without processing.
    fn pre_process(&self, _kwargs: &serde_json::Value) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    /// Called after the callback returns successfully. `kwargs` is the
    /// backend's transport-native context for this entry
    /// (`hedwig_backend_core::ConsumeBackend::post_process_hook_kwargs`).
    ///
    /// # Errors
    ///
    /// Per spec §4.3 step 4, an error here causes the entry to be nacked
    /// (the callback already ran, so this avoids a double-ack).
    fn post_process(&self, _kwargs: &serde_json::Value) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    /// Called once per pull iteration with the current rolling error count.
    fn heartbeat(&self, _error_count: u64) {}

    /// Human-readable name for this hook (used in logging/diagnostics).
    fn name(&self) -> &str;
}

/// Ordered collection of [`ConsumerHook`]s that fires them in registration
/// order.
pub struct HookRegistry {
    hooks: Vec<Box<dyn ConsumerHook>>,
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Append a hook. Hooks fire in the order they are registered.
    pub fn register(&mut self, hook: Box<dyn ConsumerHook>) {
        self.hooks.push(hook);
    }

    /// Fire [`ConsumerHook::pre_process`] on every registered hook, short
    /// circuiting on the first error (spec §4.3: "if it throws, log, nack,
    /// skip to next").
    pub fn fire_pre_process(&self, kwargs: &serde_json::Value) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for hook in &self.hooks {
            hook.pre_process(kwargs)?;
        }
        Ok(())
    }

    /// Fire [`ConsumerHook::post_process`] on every registered hook,
    /// short-circuiting on the first error.
    pub fn fire_post_process(&self, kwargs: &serde_json::Value) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for hook in &self.hooks {
            hook.post_process(kwargs)?;
        }
        Ok(())
    }

    /// Fire [`ConsumerHook::heartbeat`] on every registered hook.
    pub fn fire_heartbeat(&self, error_count: u64) {
        for hook in &self.hooks {
            hook.heartbeat(error_count);
        }
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Names of all registered hooks, in registration order.
    #[must_use]
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs pre/post-process and heartbeat transitions via `tracing`.
pub struct LoggingHook;

impl ConsumerHook for LoggingHook {
    fn pre_process(&self, kwargs: &serde_json::Value) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::debug!(target: "hedwig.consumer.hooks", ?kwargs, "pre-process");
        Ok(())
    }

    fn post_process(&self, kwargs: &serde_json::Value) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::debug!(target: "hedwig.consumer.hooks", ?kwargs, "post-process");
        Ok(())
    }

    fn heartbeat(&self, error_count: u64) {
        tracing::info!(target: "hedwig.consumer.hooks", error_count, "heartbeat");
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Updates a shared [`RunMetrics`] collector on heartbeat.
pub struct MetricsHook {
    metrics: Arc<RunMetrics>,
}

impl MetricsHook {
    /// Create a new metrics hook backed by the given collector.
    #[must_use]
    pub fn new(metrics: Arc<RunMetrics>) -> Self {
        Self { metrics }
    }

    /// Return a reference to the underlying metrics.
    #[must_use]
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }
}

impl ConsumerHook for MetricsHook {
    fn heartbeat(&self, error_count: u64) {
        self.metrics.record_heartbeat(error_count);
    }

    fn name(&self) -> &str {
        "metrics"
    }
}
