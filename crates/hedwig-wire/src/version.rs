//! Schema identifier parsing: `<type>/<major>.<minor>` and its JSON-Schema
//! URL-fragment variant.

use hedwig_core::MessageVersion;
use hedwig_error::{ErrorCode, HedwigError};

/// Parsed schema identifier: either a JSON-Schema URL fragment
/// (`<root>#/schemas/<type>/<major>.<minor>`) or a plain Protobuf-style
/// identifier (`<type>/<major>.<minor>`).
///
/// Matches the schema identifier regex `([^/]+)/([^/]+)$` capturing type and
/// `<major>.<minor>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIdentifier {
    /// Optional schema root (JSON-Schema documents only).
    pub schema_root: Option<String>,
    /// Message type, e.g. `"trip_created"`.
    pub message_type: String,
    /// Parsed version.
    pub version: MessageVersion,
}

impl SchemaIdentifier {
    /// Parse a plain Protobuf-style identifier: `<type>/<major>.<minor>`.
    pub fn parse_plain(s: &str) -> Result<Self, HedwigError> {
        let (message_type, version_s) = s.rsplit_once('/').ok_or_else(|| {
            HedwigError::new(
                ErrorCode::ValidationSchemaMismatch,
                format!("malformed schema identifier '{s}'"),
            )
        })?;
        if message_type.is_empty() {
            return Err(HedwigError::new(
                ErrorCode::ValidationInvalidMessage,
                "message type must not be empty",
            ));
        }
        let version: MessageVersion = version_s.parse().map_err(|_| {
            HedwigError::new(
                ErrorCode::ValidationSchemaMismatch,
                format!("malformed version in schema identifier '{s}'"),
            )
        })?;
        Ok(Self {
            schema_root: None,
            message_type: message_type.to_string(),
            version,
        })
    }

    /// Parse a JSON-Schema URL fragment: `<root>#/schemas/<type>/<major>.<minor>`.
    pub fn parse_json_schema_url(s: &str) -> Result<Self, HedwigError> {
        let (root, fragment) = s.split_once("#/schemas/").ok_or_else(|| {
            HedwigError::new(
                ErrorCode::ValidationSchemaMismatch,
                format!("malformed JSON-Schema identifier '{s}', expected '<root>#/schemas/<type>/<major>.<minor>'"),
            )
        })?;
        let mut parsed = Self::parse_plain(fragment)?;
        parsed.schema_root = Some(root.to_string());
        Ok(parsed)
    }
}
