//! Routing table keys and topic descriptors.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::version::MajorVersionGlob;

/// Key into the routing table and callback registry: a message type paired
/// with the `major.*` glob it was registered under.
///
/// Deliberately a dedicated newtype rather than a raw `(String, u32)` tuple
/// so both tables can be backed by the same `BTreeMap<MessageTypeRoute, _>`
/// with `Ord`/`Hash` derived once.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct MessageTypeRoute {
    /// Message type, e.g. `"trip_created"`.
    pub message_type: String,
    /// Major version glob this route applies to.
    pub major_version: MajorVersionGlob,
}

impl MessageTypeRoute {
    /// Construct a route key.
    pub fn new(message_type: impl Into<String>, major: u32) -> Self {
        Self {
            message_type: message_type.into(),
            major_version: MajorVersionGlob::new(major),
        }
    }
}

impl fmt::Display for MessageTypeRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.message_type, self.major_version)
    }
}

/// Destination of a publish: either a bare topic in the publisher's own
/// project/account, or a topic qualified with a target project/account for
/// cross-project publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TopicDescriptor {
    /// Topic in the caller's own project/account.
    Bare {
        /// Topic name.
        topic: String,
    },
    /// Topic qualified with a cross-project/account destination.
    CrossProject {
        /// Topic name.
        topic: String,
        /// Target project id (GCP) or account id (AWS).
        project_or_account: String,
    },
}

impl TopicDescriptor {
    /// The bare topic name, regardless of variant.
    pub fn topic(&self) -> &str {
        match self {
            Self::Bare { topic } | Self::CrossProject { topic, .. } => topic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_display_format() {
        let r = MessageTypeRoute::new("trip_created", 2);
        assert_eq!(r.to_string(), "trip_created/2.*");
    }

    #[test]
    fn routes_are_ordered_for_btreemap_use() {
        let a = MessageTypeRoute::new("trip_created", 1);
        let b = MessageTypeRoute::new("trip_created", 2);
        assert!(a < b);
    }

    #[test]
    fn topic_descriptor_exposes_bare_name() {
        let cross = TopicDescriptor::CrossProject {
            topic: "trips".into(),
            project_or_account: "other-project".into(),
        };
        assert_eq!(cross.topic(), "trips");
    }
}
