//! hedwig-wire
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Envelope framing primitives shared by Hedwig's validator: the
//! container-mode envelope shape, the reserved transport-attribute names
//! used by attributes mode, schema-identifier parsing, and the
//! binary/text bridging helpers.
//!
//! This crate owns the wire *shape*; `hedwig-validate` owns the encode/decode
//! *algorithm* built on top of it.

/// Envelope shape and reserved attribute constants.
pub mod envelope;
/// Schema identifier parsing.
pub mod version;

pub use envelope::{
    decode_base64_payload, encode_binary_for_text_transport, EnvelopeMetadata, JsonEnvelope, ATTR_ENCODING,
    ATTR_FORMAT_VERSION, ATTR_ID, ATTR_MESSAGE_TIMESTAMP, ATTR_PUBLISHER, ATTR_SCHEMA, ENCODING_BASE64,
    ENCODING_UTF8, FORMAT_VERSION, RESERVED_ATTRS,
};
pub use version::SchemaIdentifier;
