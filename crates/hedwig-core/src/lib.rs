//! hedwig-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable contract for Hedwig: the [`Message`] type, its builder, and
//! the routing/version primitives every other Hedwig crate is built around.
//!
//! If you only take one dependency, take this one.

/// Routing table keys and topic descriptors.
pub mod route;
/// The [`Message`] contract type and its fallible builder.
pub mod message;
/// Schema version handling.
pub mod version;

pub use message::{Headers, Message, MessageBuilder, ProviderMetadata, RESERVED_HEADER_PREFIX};
pub use route::{MessageTypeRoute, TopicDescriptor};
pub use version::{MajorVersionGlob, MessageVersion};
