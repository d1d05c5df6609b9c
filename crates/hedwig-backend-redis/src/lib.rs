//! hedwig-backend-redis
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Redis Streams transport backend (spec §4.4.3): consumer-group pull via
//! `xautoclaim` + `xreadgroup`, manual delivery-attempt counting via
//! `xpending_range`, and dead-letter movement via a single atomic pipeline.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use hedwig_backend_core::{CancellationToken, ConsumeBackend, PublishBackend, RawEntry};
use hedwig_core::{ProviderMetadata, TopicDescriptor};
use hedwig_error::{ErrorCode, HedwigError};
use redis::aio::ConnectionManager;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client, RedisError};
use uuid::Uuid;

const PAYLOAD_FIELD: &str = "hedwig_payload";

fn stream_key(topic: &str) -> String {
    format!("hedwig:{topic}")
}

fn dlq_stream_key(queue: &str) -> String {
    format!("hedwig:{queue}:dlq")
}

fn backend_error(err: RedisError, message: &str) -> HedwigError {
    HedwigError::new(ErrorCode::BackendTransportFailed, message).with_source(err)
}

/// Redis Streams backend, implementing both halves of the uniform backend
/// contract over one shared connection.
///
/// Consumer groups are assumed to already exist (spec: "Consumer groups
/// must exist; callers create them externally").
pub struct RedisBackend {
    conn: ConnectionManager,
    group: String,
    consumer_id: String,
    subscribed_streams: Vec<String>,
    main_stream: String,
    dlq_stream: String,
    max_delivery_attempts: u32,
    visibility_timeout_secs: u64,
}

impl RedisBackend {
    /// Connect to `url` and configure a backend for `queue`, additionally
    /// reading from `subscriptions` (topic names beyond the main queue
    /// stream). `visibility_timeout_secs` is asserted against every
    /// [`ConsumeBackend::extend_visibility_timeout`] call, since Redis
    /// Streams has no notion of a per-message override.
    pub async fn connect(
        url: &str,
        queue: &str,
        subscriptions: &[String],
        max_delivery_attempts: u32,
        visibility_timeout_secs: u64,
    ) -> Result<Self, HedwigError> {
        let client = Client::open(url)
            .map_err(|err| backend_error(err, "invalid redis connection url"))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|err| backend_error(err, "failed to connect to redis"))?;

        let main_stream = stream_key(queue);
        let mut subscribed_streams: Vec<String> = subscriptions.iter().map(|s| stream_key(s)).collect();
        // Main queue is always also consumed, to receive DLQ-requeued messages.
        if !subscribed_streams.contains(&main_stream) {
            subscribed_streams.push(main_stream.clone());
        }

        Ok(Self {
            conn,
            group: queue.to_string(),
            consumer_id: Uuid::new_v4().to_string(),
            subscribed_streams,
            main_stream,
            dlq_stream: dlq_stream_key(queue),
            max_delivery_attempts,
            visibility_timeout_secs,
        })
    }

    async fn autoclaim(
        &self,
        conn: &mut ConnectionManager,
        stream: &str,
        min_idle_time_ms: u64,
        count: u32,
    ) -> Result<StreamAutoClaimReply, HedwigError> {
        conn.xautoclaim_options(
            stream,
            &self.group,
            &self.consumer_id,
            min_idle_time_ms as usize,
            "0-0",
            redis::streams::StreamAutoClaimOptions::default().count(count as usize),
        )
        .await
        .map_err(|err| backend_error(err, "xautoclaim failed"))
    }

    /// Decide whether a yielded entry has exceeded its delivery budget; if
    /// so, move it to the dead-letter stream atomically and return `None`,
    /// otherwise wrap it into a [`RawEntry`] carrying the observed delivery
    /// attempt count.
    async fn accept_or_dead_letter(
        &self,
        conn: &mut ConnectionManager,
        stream: &str,
        id: &str,
        fields: HashMap<String, redis::Value>,
    ) -> Result<Option<RawEntry>, HedwigError> {
        let pending: StreamPendingCountReply = conn
            .xpending_count(stream, &self.group, id, id, 1)
            .await
            .map_err(|err| backend_error(err, "xpending_range failed"))?;
        let times_delivered = pending
            .ids
            .first()
            .map(|p| p.times_delivered as u32)
            .unwrap_or(1);

        if times_delivered > self.max_delivery_attempts {
            let raw_fields = map_to_fields(&fields)?;
            redis::pipe()
                .atomic()
                .xadd(&self.dlq_stream, "*", &raw_fields)
                .ignore()
                .xack(stream, &self.group, &[id])
                .ignore()
                .query_async::<()>(conn)
                .await
                .map_err(|err| backend_error(err, "failed to move entry to dead-letter stream"))?;
            tracing::warn!(
                target: "hedwig.backend.redis",
                stream,
                entry_id = id,
                times_delivered,
                max = self.max_delivery_attempts,
                "moved entry to dead-letter stream"
            );
            return Ok(None);
        }

        build_raw_entry(stream, id, fields, times_delivered).map(Some)
    }

    /// Move one batch of claimed DLQ entries back onto the main stream,
    /// atomically acknowledging them on the DLQ.
    async fn requeue_batch(&self, conn: &mut ConnectionManager, entries: &[StreamId]) -> Result<u32, HedwigError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut pipeline = redis::pipe();
        pipeline.atomic();
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let fields = map_to_fields(&entry.map)?;
            pipeline.xadd(&self.main_stream, "*", &fields).ignore();
            ids.push(entry.id.clone());
        }
        pipeline.xack(&self.dlq_stream, &self.group, &ids).ignore();
        pipeline
            .query_async::<()>(conn)
            .await
            .map_err(|err| backend_error(err, "failed to requeue dead-letter batch"))?;
        Ok(entries.len() as u32)
    }
}

#[async_trait]
impl PublishBackend for RedisBackend {
    async fn publish(
        &self,
        topic: &TopicDescriptor,
        payload: Vec<u8>,
        mut attributes: BTreeMap<String, String>,
    ) -> Result<String, HedwigError> {
        let key = stream_key(topic.topic());
        // Redis Streams values are UTF-8 text; base64-bridge binary payloads.
        let payload_str = match String::from_utf8(payload) {
            Ok(text) => text,
            Err(err) => {
                let (encoded, flag) = hedwig_wire::encode_binary_for_text_transport(&err.into_bytes());
                attributes.insert(hedwig_wire::ATTR_ENCODING.to_string(), flag.to_string());
                encoded
            }
        };

        let mut fields: Vec<(String, String)> = Vec::with_capacity(attributes.len() + 1);
        fields.push((PAYLOAD_FIELD.to_string(), payload_str));
        fields.extend(attributes);

        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(&key, "*", &fields)
            .await
            .map_err(|err| backend_error(err, "xadd failed"))?;

        tracing::debug!(target: "hedwig.backend.redis", stream = %key, entry_id = %id, "published to redis stream");
        Ok(id)
    }
}

#[async_trait]
impl ConsumeBackend for RedisBackend {
    async fn pull(
        &self,
        num_messages: u32,
        visibility_timeout_secs: u64,
        shutdown: &CancellationToken,
    ) -> Result<Vec<RawEntry>, HedwigError> {
        if shutdown.is_cancelled() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let mut entries = Vec::new();

        // Reclaim messages abandoned by other consumers first.
        for stream in &self.subscribed_streams {
            let claimed = self
                .autoclaim(&mut conn, stream, visibility_timeout_secs * 1000, num_messages)
                .await?;
            for claimed_id in claimed.claimed {
                if let Some(entry) = self
                    .accept_or_dead_letter(&mut conn, stream, &claimed_id.id, claimed_id.map)
                    .await?
                {
                    entries.push(entry);
                }
            }
        }

        // Then read freshly delivered entries across every subscribed stream.
        let keys: Vec<&str> = self.subscribed_streams.iter().map(String::as_str).collect();
        let ids = vec![">"; keys.len()];
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer_id)
            .count(num_messages as usize)
            .block(500);
        let reply: Option<StreamReadReply> = conn
            .xread_options(&keys, &ids, &options)
            .await
            .map_err(|err| backend_error(err, "xreadgroup failed"))?;

        if let Some(reply) = reply {
            for stream_entries in reply.keys {
                for stream_id in stream_entries.ids {
                    if let Some(entry) = self
                        .accept_or_dead_letter(&mut conn, &stream_entries.key, &stream_id.id, stream_id.map)
                        .await?
                    {
                        entries.push(entry);
                    }
                }
            }
        }

        Ok(entries)
    }

    async fn ack(&self, entry: &RawEntry) -> Result<(), HedwigError> {
        let (stream, id) = redis_identity(entry)?;
        let mut conn = self.conn.clone();
        conn.xack(stream, &self.group, &[id])
            .await
            .map_err(|err| backend_error(err, "xack failed"))
    }

    async fn nack(&self, _entry: &RawEntry) -> Result<(), HedwigError> {
        // Idle timeout handles redelivery; nothing to do.
        Ok(())
    }

    async fn extend_visibility_timeout(&self, entry: &RawEntry, seconds: u64) -> Result<(), HedwigError> {
        if seconds != self.visibility_timeout_secs {
            return Err(HedwigError::new(
                ErrorCode::BackendVisibilityTimeoutInvalid,
                "redis visibility timeout is not configurable per-call",
            )
            .with_context("configured_seconds", self.visibility_timeout_secs)
            .with_context("requested_seconds", seconds));
        }
        let (stream, id) = redis_identity(entry)?;
        let mut conn = self.conn.clone();
        // min_idle_time=0 resets the idle clock, extending visibility.
        let _: redis::streams::StreamClaimReply = conn
            .xclaim(stream, &self.group, &self.consumer_id, 0, &[id])
            .await
            .map_err(|err| backend_error(err, "xclaim failed"))?;
        Ok(())
    }

    async fn requeue_dead_letter(&self, num_messages: u32, _visibility_timeout_secs: u64) -> Result<u32, HedwigError> {
        let mut conn = self.conn.clone();
        let mut total = 0u32;

        loop {
            let reclaimed = self.autoclaim(&mut conn, &self.dlq_stream, 0, num_messages).await?;
            if reclaimed.claimed.is_empty() {
                break;
            }
            total += self.requeue_batch(&mut conn, &reclaimed.claimed).await?;
        }

        loop {
            let keys = [self.dlq_stream.as_str()];
            let ids = [">"];
            let options = StreamReadOptions::default()
                .group(&self.group, &self.consumer_id)
                .count(num_messages as usize)
                .block(500);
            let reply: Option<StreamReadReply> = conn
                .xread_options(&keys, &ids, &options)
                .await
                .map_err(|err| backend_error(err, "xreadgroup failed while draining dead-letter stream"))?;
            let Some(reply) = reply else { break };
            let batch: Vec<StreamId> = reply.keys.into_iter().flat_map(|k| k.ids).collect();
            if batch.is_empty() {
                break;
            }
            total += self.requeue_batch(&mut conn, &batch).await?;
        }

        tracing::info!(target: "hedwig.backend.redis", total_requeued = total, "drained dead-letter stream");
        Ok(total)
    }
}

fn redis_identity(entry: &RawEntry) -> Result<(&str, &str), HedwigError> {
    match &entry.provider_metadata {
        ProviderMetadata::Redis { stream, entry_id, .. } => Ok((stream.as_str(), entry_id.as_str())),
        other => Err(HedwigError::new(
            ErrorCode::Internal,
            "entry was not produced by the redis backend",
        )
        .with_context("provider_metadata", format!("{other:?}"))),
    }
}

fn value_to_string(value: &redis::Value) -> Result<String, HedwigError> {
    redis::from_redis_value(value)
        .map_err(|err| backend_error(err, "redis stream field was not a UTF-8 string"))
}

fn map_to_fields(map: &HashMap<String, redis::Value>) -> Result<Vec<(String, String)>, HedwigError> {
    map.iter()
        .map(|(k, v)| value_to_string(v).map(|v| (k.clone(), v)))
        .collect()
}

fn build_raw_entry(
    stream: &str,
    id: &str,
    fields: HashMap<String, redis::Value>,
    delivery_attempt: u32,
) -> Result<RawEntry, HedwigError> {
    let mut attributes = BTreeMap::new();
    let mut payload_field = None;
    for (key, value) in &fields {
        let value = value_to_string(value)?;
        if key == PAYLOAD_FIELD {
            payload_field = Some(value);
        } else {
            attributes.insert(key.clone(), value);
        }
    }

    let payload_str = payload_field.ok_or_else(|| {
        HedwigError::new(ErrorCode::BackendTransportFailed, "redis stream entry is missing hedwig_payload")
            .with_context("stream", stream)
            .with_context("entry_id", id)
    })?;

    let payload = if attributes.remove(hedwig_wire::ATTR_ENCODING).as_deref() == Some(hedwig_wire::ENCODING_BASE64) {
        hedwig_wire::decode_base64_payload(&payload_str)
            .map_err(|err| HedwigError::new(ErrorCode::ValidationDecodeFailed, "invalid base64 payload").with_source(err))?
    } else {
        payload_str.into_bytes()
    };

    Ok(RawEntry {
        payload,
        attributes,
        provider_metadata: ProviderMetadata::Redis {
            stream: stream.to_string(),
            entry_id: id.to_string(),
            delivery_attempt,
        },
        native: serde_json::json!({ "stream": stream, "id": id, "delivery_attempt": delivery_attempt }),
    })
}
