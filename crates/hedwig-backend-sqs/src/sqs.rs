//! SQS consume backend (spec §4.4.1): long-poll pull, no-op nack (the
//! broker's redrive policy owns dead-lettering), and batched DLQ requeue.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_sqs::types::{DeleteMessageBatchRequestEntry, MessageSystemAttributeName, SendMessageBatchRequestEntry};
use hedwig_backend_core::{CancellationToken, ConsumeBackend, RawEntry};
use hedwig_core::ProviderMetadata;
use hedwig_error::{ErrorCode, HedwigError};
use tokio::sync::OnceCell;

use crate::{dlq_queue_name, main_queue_name};

/// SQS receive-message long-poll duration (spec §4.4.1: "Long-poll pull
/// with `WaitTimeSeconds=20`").
const WAIT_TIME_SECONDS: i32 = 20;

/// SQS's hard per-call batch limit for receive/send/delete.
const SQS_BATCH_LIMIT: i32 = 10;

/// Pulls from, acks, and requeues a single SQS queue (plus its paired DLQ).
pub struct SqsBackend {
    client: aws_sdk_sqs::Client,
    queue_name: String,
    dlq_name: String,
    queue_url: OnceCell<String>,
    dlq_url: OnceCell<String>,
}

impl SqsBackend {
    /// Construct a backend over an already-configured SQS client, for the
    /// queue named `queue` (the `HEDWIG-`/`HEDWIG-...-DLQ` prefixing is
    /// applied internally).
    #[must_use]
    pub fn new(client: aws_sdk_sqs::Client, queue: &str) -> Self {
        Self {
            client,
            queue_name: main_queue_name(queue),
            dlq_name: dlq_queue_name(queue),
            queue_url: OnceCell::new(),
            dlq_url: OnceCell::new(),
        }
    }

    async fn queue_url(&self) -> Result<&str, HedwigError> {
        self.resolve_url(&self.queue_url, &self.queue_name).await
    }

    async fn dlq_url(&self) -> Result<&str, HedwigError> {
        self.resolve_url(&self.dlq_url, &self.dlq_name).await
    }

    async fn resolve_url<'a>(&self, cell: &'a OnceCell<String>, name: &str) -> Result<&'a str, HedwigError> {
        cell.get_or_try_init(|| async {
            let response = self.client.get_queue_url().queue_name(name).send().await.map_err(|err| {
                HedwigError::new(ErrorCode::BackendNotFound, "failed to resolve SQS queue url")
                    .with_context("queue_name", name)
                    .with_source(err)
            })?;
            response.queue_url().map(str::to_string).ok_or_else(|| {
                HedwigError::new(ErrorCode::BackendNotFound, "SQS GetQueueUrl returned no url")
                    .with_context("queue_name", name)
            })
        })
        .await
        .map(String::as_str)
    }

    async fn pull_from(&self, queue_url: &str, num_messages: u32) -> Result<Vec<RawEntry>, HedwigError> {
        let response = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages((num_messages as i32).clamp(1, SQS_BATCH_LIMIT))
            .wait_time_seconds(WAIT_TIME_SECONDS)
            .message_attribute_names("All")
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|err| {
                HedwigError::new(ErrorCode::BackendTransportFailed, "SQS ReceiveMessage failed")
                    .with_context("queue_url", queue_url)
                    .with_source(err)
            })?;

        response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|message| sqs_message_into_raw_entry(message))
            .collect()
    }
}

#[async_trait]
impl ConsumeBackend for SqsBackend {
    async fn pull(
        &self,
        num_messages: u32,
        _visibility_timeout_secs: u64,
        shutdown: &CancellationToken,
    ) -> Result<Vec<RawEntry>, HedwigError> {
        if shutdown.is_cancelled() {
            return Ok(Vec::new());
        }
        let queue_url = self.queue_url().await?.to_string();
        self.pull_from(&queue_url, num_messages).await
    }

    async fn ack(&self, entry: &RawEntry) -> Result<(), HedwigError> {
        let receipt_handle = sqs_receipt_handle(entry)?;
        let queue_url = self.queue_url().await?.to_string();
        self.client
            .delete_message()
            .queue_url(&queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|err| HedwigError::new(ErrorCode::BackendTransportFailed, "SQS DeleteMessage failed").with_source(err))?;
        Ok(())
    }

    async fn nack(&self, _entry: &RawEntry) -> Result<(), HedwigError> {
        // No-op: the broker's redrive policy owns dead-lettering.
        Ok(())
    }

    async fn extend_visibility_timeout(&self, entry: &RawEntry, seconds: u64) -> Result<(), HedwigError> {
        let receipt_handle = sqs_receipt_handle(entry)?;
        let queue_url = self.queue_url().await?.to_string();
        self.client
            .change_message_visibility()
            .queue_url(&queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(seconds as i32)
            .send()
            .await
            .map_err(|err| {
                HedwigError::new(ErrorCode::BackendVisibilityTimeoutInvalid, "SQS ChangeMessageVisibility failed")
                    .with_source(err)
            })?;
        Ok(())
    }

    async fn requeue_dead_letter(&self, num_messages: u32, visibility_timeout_secs: u64) -> Result<u32, HedwigError> {
        let dlq_url = self.dlq_url().await?.to_string();
        let queue_url = self.queue_url().await?.to_string();
        let mut total = 0u32;

        loop {
            let received = self
                .client
                .receive_message()
                .queue_url(&dlq_url)
                .max_number_of_messages((num_messages as i32).clamp(1, SQS_BATCH_LIMIT))
                .visibility_timeout(visibility_timeout_secs as i32)
                .message_attribute_names("All")
                .send()
                .await
                .map_err(|err| {
                    HedwigError::new(ErrorCode::BackendTransportFailed, "SQS ReceiveMessage (DLQ) failed").with_source(err)
                })?;
            let messages = received.messages.unwrap_or_default();
            if messages.is_empty() {
                break;
            }

            let mut send_entries = Vec::with_capacity(messages.len());
            for message in &messages {
                let id = message.message_id().unwrap_or_default().to_string();
                let body = message.body().unwrap_or_default().to_string();
                let mut builder = SendMessageBatchRequestEntry::builder().id(id).message_body(body);
                if let Some(attrs) = &message.message_attributes {
                    builder = builder.set_message_attributes(Some(attrs.clone()));
                }
                send_entries.push(builder.build().map_err(|err| {
                    HedwigError::new(ErrorCode::Internal, "failed to build SQS send-batch entry").with_source(err)
                })?);
            }

            let send_result = self
                .client
                .send_message_batch()
                .queue_url(&queue_url)
                .set_entries(Some(send_entries))
                .send()
                .await
                .map_err(|err| {
                    HedwigError::new(ErrorCode::BackendTransportFailed, "SQS SendMessageBatch failed").with_source(err)
                })?;

            let failed = send_result.failed;
            if !failed.is_empty() {
                return Err(HedwigError::new(
                    ErrorCode::BackendPartialFailure,
                    "partial failure requeuing dead-letter messages; stopping",
                )
                .with_context("successful_count", send_result.successful.len())
                .with_context("failed_count", failed.len()));
            }

            let delete_entries: Vec<DeleteMessageBatchRequestEntry> = messages
                .iter()
                .map(|message| {
                    DeleteMessageBatchRequestEntry::builder()
                        .id(message.message_id().unwrap_or_default())
                        .receipt_handle(message.receipt_handle().unwrap_or_default())
                        .build()
                        .map_err(|err| {
                            HedwigError::new(ErrorCode::Internal, "failed to build SQS delete-batch entry").with_source(err)
                        })
                })
                .collect::<Result<_, _>>()?;

            self.client
                .delete_message_batch()
                .queue_url(&dlq_url)
                .set_entries(Some(delete_entries))
                .send()
                .await
                .map_err(|err| {
                    HedwigError::new(ErrorCode::BackendTransportFailed, "SQS DeleteMessageBatch (DLQ) failed").with_source(err)
                })?;

            total += messages.len() as u32;
            tracing::info!(target: "hedwig.backend.sqs", count = messages.len(), "requeued batch from dead-letter queue");
        }

        Ok(total)
    }
}

fn sqs_receipt_handle(entry: &RawEntry) -> Result<&str, HedwigError> {
    match &entry.provider_metadata {
        ProviderMetadata::Sqs { receipt_handle, .. } => Ok(receipt_handle.as_str()),
        other => Err(HedwigError::new(ErrorCode::Internal, "entry was not produced by the SQS backend")
            .with_context("provider_metadata", format!("{other:?}"))),
    }
}

fn sqs_message_into_raw_entry(message: aws_sdk_sqs::types::Message) -> Result<RawEntry, HedwigError> {
    let receipt_handle = message
        .receipt_handle()
        .ok_or_else(|| HedwigError::new(ErrorCode::BackendTransportFailed, "SQS message is missing a receipt handle"))?
        .to_string();
    let body = message.body().unwrap_or_default().to_string();

    let mut attributes = BTreeMap::new();
    if let Some(message_attrs) = &message.message_attributes {
        for (key, value) in message_attrs {
            if let Some(string_value) = value.string_value() {
                attributes.insert(key.clone(), string_value.to_string());
            }
        }
    }

    let system_attrs = message.attributes.unwrap_or_default();
    let sent_timestamp = system_attrs
        .get(&MessageSystemAttributeName::SentTimestamp)
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(chrono::DateTime::from_timestamp_millis)
        .unwrap_or_else(chrono::Utc::now);
    let first_receive_timestamp = system_attrs
        .get(&MessageSystemAttributeName::ApproximateFirstReceiveTimestamp)
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(chrono::DateTime::from_timestamp_millis);
    let receive_count = system_attrs
        .get(&MessageSystemAttributeName::ApproximateReceiveCount)
        .and_then(|n| n.parse::<u32>().ok())
        .unwrap_or(1);

    Ok(RawEntry {
        payload: body.into_bytes(),
        attributes,
        provider_metadata: ProviderMetadata::Sqs {
            receipt_handle,
            sent_timestamp,
            first_receive_timestamp,
            receive_count,
        },
        native: serde_json::Value::Null,
    })
}
