//! hedwig-backend-sqs
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! SQS consume-side and SNS publish-side transport backend (spec §4.4.1).
//! The two halves are independent backends (an SNS-only publisher never
//! needs SQS credentials, and vice versa), matching the split already drawn
//! by [`hedwig_backend_core::PublishBackend`] / [`hedwig_backend_core::ConsumeBackend`].

mod sns;
mod sqs;

pub use sns::SnsBackend;
pub use sqs::SqsBackend;

/// SQS queue-name convention: `HEDWIG-<queue>` main, `HEDWIG-<queue>-DLQ`
/// dead-letter (spec §4.4.1).
pub(crate) fn main_queue_name(queue: &str) -> String {
    format!("HEDWIG-{queue}")
}

pub(crate) fn dlq_queue_name(queue: &str) -> String {
    format!("HEDWIG-{queue}-DLQ")
}

/// SNS topic-name convention: `hedwig-<topic>`.
pub(crate) fn topic_name(topic: &str) -> String {
    format!("hedwig-{topic}")
}
