//! hedwig-backend-mock
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Two in-process backends used when a real transport is unnecessary:
//!
//! - [`MockBackend`] simply reports success for every publish, assigning a
//!   random message id. Intended for `publisher_enabled_sync` mode local
//!   development, where messages are accepted but never actually delivered
//!   anywhere.
//! - [`CapturingBackend`] records every published message so a consuming
//!   application's own test suite can assert on what was published,
//!   supplementing the original implementation's pytest plugin
//!   (`examples/original_source/hedwig/testing/`).

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use hedwig_backend_core::PublishBackend;
use hedwig_core::TopicDescriptor;
use hedwig_error::HedwigError;
use uuid::Uuid;

/// Always-succeeds publish backend for local development.
#[derive(Debug, Clone, Default)]
pub struct MockBackend;

impl MockBackend {
    /// Construct a new mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PublishBackend for MockBackend {
    async fn publish(
        &self,
        topic: &TopicDescriptor,
        _payload: Vec<u8>,
        _attributes: BTreeMap<String, String>,
    ) -> Result<String, HedwigError> {
        let id = Uuid::new_v4().to_string();
        tracing::debug!(topic = topic.topic(), message_id = %id, "mock backend accepted publish");
        Ok(id)
    }
}

/// A single message recorded by [`CapturingBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPublish {
    /// Destination topic.
    pub topic: TopicDescriptor,
    /// Raw payload bytes as handed to the backend.
    pub payload: Vec<u8>,
    /// Transport attributes as handed to the backend.
    pub attributes: BTreeMap<String, String>,
    /// The id this backend assigned.
    pub message_id: String,
}

/// Publish backend that records every call for later assertions.
///
/// `Default`-constructible and cheap to clone (an `Arc` around the captured
/// list would be the natural extension for multi-threaded tests, but every
/// Hedwig publish path runs on a single consumer/publisher task, so a plain
/// `Mutex<Vec<_>>` behind an owned struct is sufficient here).
pub struct CapturingBackend {
    captured: Mutex<Vec<CapturedPublish>>,
}

impl CapturingBackend {
    /// Construct an empty capturing backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            captured: Mutex::new(Vec::new()),
        }
    }

    /// Return a snapshot of every message published so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<CapturedPublish> {
        self.captured.lock().expect("capture lock poisoned").clone()
    }

    /// Discard all captured messages.
    pub fn clear(&self) {
        self.captured.lock().expect("capture lock poisoned").clear();
    }

    /// Number of messages captured so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.captured.lock().expect("capture lock poisoned").len()
    }

    /// Returns `true` if nothing has been captured yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CapturingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublishBackend for CapturingBackend {
    async fn publish(
        &self,
        topic: &TopicDescriptor,
        payload: Vec<u8>,
        attributes: BTreeMap<String, String>,
    ) -> Result<String, HedwigError> {
        let message_id = Uuid::new_v4().to_string();
        self.captured
            .lock()
            .expect("capture lock poisoned")
            .push(CapturedPublish {
                topic: topic.clone(),
                payload,
                attributes,
                message_id: message_id.clone(),
            });
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic() -> TopicDescriptor {
        TopicDescriptor::Bare { topic: "trips".into() }
    }

    #[tokio::test]
    async fn mock_backend_always_succeeds() {
        let backend = MockBackend::new();
        let id = backend.publish(&topic(), b"{}".to_vec(), BTreeMap::new()).await.unwrap();
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn capturing_backend_records_published_messages() {
        let backend = CapturingBackend::new();
        assert!(backend.is_empty());
        backend
            .publish(&topic(), b"{\"trip_id\":\"abc\"}".to_vec(), BTreeMap::new())
            .await
            .unwrap();
        backend
            .publish(&topic(), b"{\"trip_id\":\"def\"}".to_vec(), BTreeMap::new())
            .await
            .unwrap();
        let published = backend.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].payload, b"{\"trip_id\":\"abc\"}");
        assert_eq!(backend.len(), 2);
    }

    #[tokio::test]
    async fn capturing_backend_clear_empties_capture() {
        let backend = CapturingBackend::new();
        backend.publish(&topic(), b"{}".to_vec(), BTreeMap::new()).await.unwrap();
        backend.clear();
        assert!(backend.is_empty());
    }
}
