//! SNS publish backend (spec §4.4.1: "Topics: `hedwig-<topic>` under the
//! configured account (or a cross-account account id from the routing
//! table)").

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_sns::types::MessageAttributeValue;
use hedwig_backend_core::PublishBackend;
use hedwig_core::TopicDescriptor;
use hedwig_error::{ErrorCode, HedwigError};

use crate::topic_name;

/// Publishes already-encoded Hedwig messages to SNS topics.
///
/// Callers wrap this in `hedwig-retry`'s bounded backoff
/// (`hedwig_publisher::RetryBehavior::Wrapped`) per spec §7 — this backend
/// itself makes exactly one publish attempt.
pub struct SnsBackend {
    client: aws_sdk_sns::Client,
    region: String,
    default_account_id: Option<String>,
}

impl SnsBackend {
    /// Construct a backend over an already-configured SNS client.
    ///
    /// `default_account_id` is used for [`TopicDescriptor::Bare`] publishes;
    /// [`TopicDescriptor::CrossProject`] always supplies its own account id.
    #[must_use]
    pub fn new(client: aws_sdk_sns::Client, region: impl Into<String>, default_account_id: Option<String>) -> Self {
        Self {
            client,
            region: region.into(),
            default_account_id,
        }
    }

    fn topic_arn(&self, topic: &TopicDescriptor) -> Result<String, HedwigError> {
        let account_id = match topic {
            TopicDescriptor::Bare { .. } => self.default_account_id.clone(),
            TopicDescriptor::CrossProject { project_or_account, .. } => Some(project_or_account.clone()),
        }
        .ok_or_else(|| {
            HedwigError::new(ErrorCode::ConfigInvalid, "no AWS account id configured for this publish")
                .with_context("topic", topic.topic())
        })?;
        Ok(format!("arn:aws:sns:{}:{}:{}", self.region, account_id, topic_name(topic.topic())))
    }
}

#[async_trait]
impl PublishBackend for SnsBackend {
    async fn publish(
        &self,
        topic: &TopicDescriptor,
        payload: Vec<u8>,
        mut attributes: BTreeMap<String, String>,
    ) -> Result<String, HedwigError> {
        let arn = self.topic_arn(topic)?;

        // SNS messages are UTF-8 text; base64-bridge binary payloads.
        let message = match String::from_utf8(payload) {
            Ok(text) => text,
            Err(err) => {
                let (encoded, flag) = hedwig_wire::encode_binary_for_text_transport(&err.into_bytes());
                attributes.insert(hedwig_wire::ATTR_ENCODING.to_string(), flag.to_string());
                encoded
            }
        };

        let mut message_attributes = std::collections::HashMap::with_capacity(attributes.len());
        for (key, value) in attributes {
            let attr = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
                .map_err(|err| {
                    HedwigError::new(ErrorCode::Internal, "failed to build SNS message attribute").with_source(err)
                })?;
            message_attributes.insert(key, attr);
        }

        let response = self
            .client
            .publish()
            .topic_arn(&arn)
            .message(message)
            .set_message_attributes(Some(message_attributes))
            .send()
            .await
            .map_err(|err| {
                HedwigError::new(ErrorCode::BackendTransportFailed, "SNS publish failed")
                    .with_context("topic_arn", arn.clone())
                    .with_source(err)
            })?;

        let message_id = response
            .message_id()
            .ok_or_else(|| HedwigError::new(ErrorCode::BackendTransportFailed, "SNS publish returned no message id"))?
            .to_string();

        tracing::info!(target: "hedwig.backend.sns", topic_arn = %arn, message_id = %message_id, "published to sns");
        Ok(message_id)
    }
}
