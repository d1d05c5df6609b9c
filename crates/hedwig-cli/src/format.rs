//! Output formatting utilities for the Hedwig CLI.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use hedwig_core::{Message, ProviderMetadata};
use serde::{Deserialize, Serialize};

/// Supported output formats for CLI display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Compact JSON (single line).
    Json,
    /// Pretty-printed JSON.
    JsonPretty,
    /// Human-readable multi-line text.
    Text,
    /// Key-value aligned table.
    Table,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Json => "json",
            Self::JsonPretty => "json-pretty",
            Self::Text => "text",
            Self::Table => "table",
        };
        f.write_str(s)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "json-pretty" | "json_pretty" | "jsonpretty" => Ok(Self::JsonPretty),
            "text" => Ok(Self::Text),
            "table" => Ok(Self::Table),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Formats Hedwig domain types for CLI output.
#[derive(Debug, Clone)]
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Create a new formatter with the given output format.
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Format a [`Message`] according to the configured output format.
    #[must_use]
    pub fn format_message(&self, message: &Message) -> String {
        match &self.format {
            OutputFormat::Json => serde_json::to_string(message).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(message).unwrap_or_default(),
            OutputFormat::Text => format_message_text(message),
            OutputFormat::Table => format_message_table(message),
        }
    }

    /// Format a list of diagnostic strings (from `config check`).
    #[must_use]
    pub fn format_diagnostics(&self, diagnostics: &[String]) -> String {
        match &self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => {
                serde_json::to_string_pretty(&diagnostics).unwrap_or_default()
            }
            OutputFormat::Text | OutputFormat::Table => diagnostics.join("\n"),
        }
    }
}

fn provider_str(m: &ProviderMetadata) -> &'static str {
    match m {
        ProviderMetadata::None => "none",
        ProviderMetadata::Sqs { .. } => "sqs",
        ProviderMetadata::PubSub { .. } => "pubsub",
        ProviderMetadata::Redis { .. } => "redis",
    }
}

fn format_message_text(m: &Message) -> String {
    format!(
        "id:        {}\ntype:      {}\nversion:   {}.{}\npublisher: {}\nheaders:   {}\nprovider:  {}",
        m.id,
        m.message_type,
        m.version.major,
        m.version.minor,
        m.publisher,
        m.headers.len(),
        provider_str(&m.provider_metadata),
    )
}

fn format_message_table(m: &Message) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{:<10} {}", "id", m.id));
    lines.push(format!("{:<10} {}", "type", m.message_type));
    lines.push(format!("{:<10} {}.{}", "version", m.version.major, m.version.minor));
    lines.push(format!("{:<10} {}", "publisher", m.publisher));
    lines.push(format!("{:<10} {}", "headers", m.headers.len()));
    lines.push(format!("{:<10} {}", "provider", provider_str(&m.provider_metadata)));
    lines.join("\n")
}
