//! Shared command implementations for the Hedwig CLI.
//!
//! These functions are library-level so they can be tested without
//! spawning the binary.

use std::path::Path;

use anyhow::{Context, Result};
use schemars::schema_for;

use hedwig_config::HedwigFileConfig;
use hedwig_core::Message;

/// Schema kinds the `schema` subcommand can print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// JSON schema for the file/env-loadable [`HedwigFileConfig`].
    Config,
    /// JSON schema for the wire-level [`Message`] envelope.
    Message,
}

/// Return the JSON schema string for the given kind.
pub fn schema_json(kind: SchemaKind) -> Result<String> {
    let value = match kind {
        SchemaKind::Config => serde_json::to_value(schema_for!(HedwigFileConfig))?,
        SchemaKind::Message => serde_json::to_value(schema_for!(Message))?,
    };
    serde_json::to_string_pretty(&value).context("serialize schema")
}

/// Parse a message envelope JSON file and check it against the structural
/// invariants every [`Message`] must satisfy (non-empty id/type, non-zero
/// major version, no `hedwig_`-prefixed header keys, `timestamp > 0`).
///
/// This does not validate `data` against an application schema — that
/// requires a `Validator` wired to the application's schema registry, which
/// the CLI has no way to discover on its own.
pub fn validate_message_file(path: &Path) -> Result<Message> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read message file '{}'", path.display()))?;

    let message: Message = serde_json::from_str(&content)
        .with_context(|| format!("parse message from '{}'", path.display()))?;

    message
        .validate()
        .with_context(|| format!("validate message from '{}'", path.display()))?;

    Ok(message)
}

/// Load and validate a configuration file.
///
/// Returns a list of human-readable diagnostic messages (errors and warnings).
pub fn config_check(path: Option<&Path>) -> Result<Vec<String>> {
    let mut diagnostics = Vec::new();

    let config = match hedwig_config::load_config(path) {
        Ok(c) => c,
        Err(e) => {
            diagnostics.push(format!("error: {e}"));
            return Ok(diagnostics);
        }
    };

    match hedwig_config::validate_config(&config) {
        Ok(warnings) => {
            diagnostics.push("config: ok".into());
            diagnostics.extend(warnings.iter().map(|w| format!("warning: {w}")));
        }
        Err(e) => diagnostics.push(format!("error: {e}")),
    }

    Ok(diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hedwig_core::{MessageBuilder, MessageVersion};

    #[test]
    fn schema_config_is_valid_json() {
        let s = schema_json(SchemaKind::Config).unwrap();
        let v: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert!(v.get("properties").is_some());
    }

    #[test]
    fn schema_message_is_valid_json() {
        let s = schema_json(SchemaKind::Message).unwrap();
        let _: serde_json::Value = serde_json::from_str(&s).unwrap();
    }

    #[test]
    fn validate_message_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(validate_message_file(&path).is_err());
    }

    #[test]
    fn validate_message_rejects_invariant_violation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad_version.json");
        std::fs::write(
            &path,
            r#"{"id":"1","message_type":"t","version":{"major":0,"minor":0},"timestamp":1,"publisher":"p","headers":{},"data":{}}"#,
        )
        .unwrap();
        assert!(validate_message_file(&path).is_err());
    }

    #[test]
    fn validate_message_accepts_valid() {
        let message = MessageBuilder::new("trip_created", MessageVersion::new(1, 0).unwrap())
            .publisher("trip-service")
            .data(serde_json::json!({"trip_id": "abc"}))
            .build()
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valid.json");
        std::fs::write(&path, serde_json::to_string_pretty(&message).unwrap()).unwrap();
        let parsed = validate_message_file(&path).unwrap();
        assert_eq!(parsed.message_type, "trip_created");
    }

    #[test]
    fn config_check_defaults_ok() {
        let diags = config_check(None).unwrap();
        assert!(diags.iter().any(|d| d.contains("ok")));
    }

    #[test]
    fn config_check_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid [toml =").unwrap();
        let diags = config_check(Some(&path)).unwrap();
        assert!(diags.iter().any(|d| d.starts_with("error:")));
    }
}
