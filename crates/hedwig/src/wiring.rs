//! Backend construction: turns a [`HedwigFileConfig`] plus per-transport
//! extras (already-configured SDK clients, subscription lists) into the
//! `Arc<dyn PublishBackend>` / `Arc<dyn ConsumeBackend>` pair a
//! [`crate::Hedwig`] is built over.

use std::sync::Arc;

use hedwig_backend_core::{ConsumeBackend, PublishBackend};
use hedwig_backend_gcp::{GcpBackend, SubscriptionRoute};
use hedwig_backend_mock::MockBackend;
use hedwig_backend_redis::RedisBackend;
use hedwig_backend_sqs::{SnsBackend, SqsBackend};
use hedwig_config::{BackendKind, HedwigFileConfig};
use hedwig_error::{ErrorCode, HedwigError};

/// Transport-specific inputs [`HedwigFileConfig`] alone cannot supply
/// (already-authenticated SDK clients, which subscriptions to stream from).
/// One variant per [`BackendKind`]; [`build`] rejects a mismatch between
/// `config.backend` and the supplied variant.
pub enum BackendWiring {
    /// No transport; publishes are accepted in-process and never delivered.
    Mock,
    /// SNS for publish, SQS for consume.
    Sqs {
        /// Pre-built SNS client.
        sns_client: aws_sdk_sns::Client,
        /// Pre-built SQS client.
        sqs_client: aws_sdk_sqs::Client,
        /// AWS region, used to build SNS topic ARNs.
        region: String,
    },
    /// Google Cloud Pub/Sub for both publish and streaming-pull consume.
    Gcp {
        /// Already-authenticated client configuration.
        client_config: google_cloud_pubsub::client::ClientConfig,
        /// Subscriptions to stream from, in addition to the implicit main
        /// subscription (spec §4.4.2).
        subscriptions: Vec<SubscriptionRoute>,
    },
    /// Redis Streams for both publish and consume.
    Redis {
        /// Streams (topics) to consume from, in addition to the queue's own
        /// main stream.
        subscriptions: Vec<String>,
    },
}

/// The publish and (optional) consume halves of a wired-up transport.
pub struct BackendHandles {
    /// Always present: every backend can publish.
    pub publish: Arc<dyn PublishBackend>,
    /// Present for every backend except [`BackendWiring::Mock`], which has
    /// no consume side (spec: "never touches the network").
    pub consume: Option<Arc<dyn ConsumeBackend>>,
}

/// Build backend handles for `config`, using `wiring` for the
/// transport-specific inputs `config` alone cannot carry.
pub async fn build(config: &HedwigFileConfig, wiring: BackendWiring) -> Result<BackendHandles, HedwigError> {
    match (config.backend, wiring) {
        (BackendKind::Mock, BackendWiring::Mock) => Ok(BackendHandles {
            publish: Arc::new(MockBackend::new()),
            consume: None,
        }),

        (BackendKind::Sqs, BackendWiring::Sqs { sns_client, sqs_client, region }) => {
            let default_account_id = config.aws.as_ref().and_then(|aws| aws.account_id.clone());
            let sns = Arc::new(SnsBackend::new(sns_client, region, default_account_id));
            let sqs = Arc::new(SqsBackend::new(sqs_client, &config.queue));
            Ok(BackendHandles { publish: sns, consume: Some(sqs) })
        }

        (BackendKind::GooglePubSub, BackendWiring::Gcp { client_config, subscriptions }) => {
            let project_id = config
                .gcp
                .as_ref()
                .and_then(|gcp| gcp.project_id.clone())
                .ok_or_else(|| HedwigError::new(ErrorCode::ConfigInvalid, "gcp.project_id is required for the pubsub backend"))?;
            let backend = Arc::new(GcpBackend::connect(client_config, project_id, config.queue.clone(), subscriptions).await?);
            Ok(BackendHandles { publish: backend.clone(), consume: Some(backend) })
        }

        (BackendKind::Redis, BackendWiring::Redis { subscriptions }) => {
            let redis_config = config
                .redis
                .clone()
                .ok_or_else(|| HedwigError::new(ErrorCode::ConfigInvalid, "redis config is required for the redis backend"))?;
            let visibility_timeout_secs = config.visibility_timeout_secs.unwrap_or(30);
            let backend = Arc::new(
                RedisBackend::connect(
                    &redis_config.url,
                    &config.queue,
                    &subscriptions,
                    redis_config.max_delivery_attempts,
                    visibility_timeout_secs,
                )
                .await?,
            );
            Ok(BackendHandles { publish: backend.clone(), consume: Some(backend) })
        }

        (backend, _) => Err(HedwigError::new(
            ErrorCode::ConfigInvalid,
            "supplied backend wiring does not match config.backend",
        )
        .with_context("configured_backend", format!("{backend:?}"))),
    }
}
