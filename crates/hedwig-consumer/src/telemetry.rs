// SPDX-License-Identifier: MIT OR Apache-2.0
//! Telemetry and metrics collection for the consumer loop.
//!
//! Tracks the rolling error counter described in spec §4.3/§8 invariant 7:
//! a successful callback resets the counter to zero, and an inactivity
//! timer (if configured) resets it after N seconds with no messages.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// Atomic consumer-loop metrics that can be shared across threads.
pub struct RunMetrics {
    messages_processed: AtomicU64,
    messages_acked: AtomicU64,
    messages_nacked: AtomicU64,
    total_errors: AtomicU64,
    current_error_count: AtomicU64,
    pulls: AtomicU64,
}

impl RunMetrics {
    /// Create a new, zero-initialised metrics collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages_processed: AtomicU64::new(0),
            messages_acked: AtomicU64::new(0),
            messages_nacked: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            current_error_count: AtomicU64::new(0),
            pulls: AtomicU64::new(0),
        }
    }

    /// Record a successful ack. Resets the rolling error counter to zero
    /// (spec §8 invariant 7).
    pub fn record_success(&self) {
        self.messages_processed.fetch_add(1, Relaxed);
        self.messages_acked.fetch_add(1, Relaxed);
        self.current_error_count.store(0, Relaxed);
    }

    /// Record a nack. Per spec §7, only uncaught callback exceptions
    /// increment the error counter; `count_as_error` distinguishes those
    /// from ignore/logging/retry/validation nacks, which do not.
    pub fn record_nack(&self, count_as_error: bool) {
        self.messages_processed.fetch_add(1, Relaxed);
        self.messages_nacked.fetch_add(1, Relaxed);
        if count_as_error {
            self.total_errors.fetch_add(1, Relaxed);
            self.current_error_count.fetch_add(1, Relaxed);
        }
    }

    /// Reset the rolling error counter, e.g. from an inactivity timer that
    /// fires after N seconds with no messages.
    pub fn reset_error_count(&self) {
        self.current_error_count.store(0, Relaxed);
    }

    /// Called once per pull iteration. Records the heartbeat and returns the
    /// current error count, matching `heartbeat_hook(error_count)`.
    pub fn record_heartbeat(&self, error_count: u64) -> u64 {
        self.pulls.fetch_add(1, Relaxed);
        self.current_error_count.store(error_count, Relaxed);
        error_count
    }

    /// Current rolling error count, as seen by `heartbeat_hook`.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.current_error_count.load(Relaxed)
    }

    /// Take a point-in-time snapshot of the current metric values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_processed: self.messages_processed.load(Relaxed),
            messages_acked: self.messages_acked.load(Relaxed),
            messages_nacked: self.messages_nacked.load(Relaxed),
            total_errors: self.total_errors.load(Relaxed),
            last_error_count: self.current_error_count.load(Relaxed),
            pulls: self.pulls.load(Relaxed),
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-atomic, serialisable snapshot of [`RunMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Total number of entries processed (acked or nacked).
    pub messages_processed: u64,
    /// Number of entries acked.
    pub messages_acked: u64,
    /// Number of entries nacked.
    pub messages_nacked: u64,
    /// Cumulative count of uncaught-callback-exception errors.
    pub total_errors: u64,
    /// Rolling error count as last reported to `heartbeat_hook`.
    pub last_error_count: u64,
    /// Number of pull iterations completed.
    pub pulls: u64,
}
