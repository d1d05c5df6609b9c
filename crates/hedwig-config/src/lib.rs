//! Configuration loading, validation, and merging for Hedwig.
//!
//! This crate provides [`HedwigFileConfig`] — the file/env-loadable slice of
//! the resolved `Settings` record (spec component C1: backend choice,
//! validator choice, timeouts) — together with helpers for loading from TOML
//! files, merging overlays, and producing advisory [`ConfigWarning`]s.
//!
//! The routing table and callback registry, the other two pieces of C1, are
//! not file-loadable (they hold Rust closures and typed topic descriptors)
//! and are assembled programmatically by the `hedwig` facade crate on top of
//! the config this crate produces.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// A timeout-like value is unusually large.
    LargeTimeout {
        /// Name of the setting.
        setting: String,
        /// Value in seconds.
        secs: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeTimeout { setting, secs } => {
                write!(f, "'{setting}' has an unusually large value ({secs}s)")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Which transport backend a consumer/publisher is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process backend; never touches the network. Used in tests.
    Mock,
    /// Amazon SQS (consume) + SNS (publish).
    Sqs,
    /// Google Cloud Pub/Sub.
    GooglePubSub,
    /// Redis Streams.
    Redis,
}

/// Message wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// JSON-Schema draft-4 validated payloads.
    JsonSchema,
    /// Protobuf payloads.
    Protobuf,
}

/// Validator configuration: wire format and framing mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidatorSettings {
    /// Wire format used to encode/decode `data`.
    pub format: WireFormat,
    /// When true, envelope fields ride as `hedwig_`-prefixed transport
    /// attributes and `data` alone is the payload ("attributes mode").
    /// When false, the full envelope is the payload ("container mode").
    #[serde(default)]
    pub attributes_mode: bool,
    /// JSON-Schema document root, required when `format` is `JsonSchema`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_root: Option<String>,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            format: WireFormat::JsonSchema,
            attributes_mode: false,
            schema_root: None,
        }
    }
}

/// SQS/SNS-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AwsBackendConfig {
    /// AWS region override; when absent the SDK's default provider chain applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Default cross-account id for publishes lacking a routing override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Pub/Sub-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GcpBackendConfig {
    /// GCP project id subscriptions/topics live in by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// Redis Streams-specific settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RedisBackendConfig {
    /// Connection URL, e.g. `redis://localhost:6379`.
    pub url: String,
    /// Delivery attempts before a Redis Streams entry is moved to the DLQ.
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
}

fn default_max_delivery_attempts() -> u32 {
    5
}

impl Default for RedisBackendConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".into(),
            max_delivery_attempts: default_max_delivery_attempts(),
        }
    }
}

/// The file/env-loadable slice of Hedwig's resolved settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HedwigFileConfig {
    /// Which transport backend to use.
    pub backend: BackendKind,
    /// Base queue name, combined with the `HEDWIG-` / `hedwig:` prefix per backend.
    pub queue: String,
    /// Identifies this process as a message producer.
    pub publisher: String,
    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Validator wire format and framing mode.
    #[serde(default)]
    pub validator: ValidatorSettings,
    /// Number of messages to pull per batch. Mirrors the original
    /// implementation's CLI default of 10.
    #[serde(default = "default_num_messages")]
    pub num_messages: u32,
    /// Per-pull visibility/ack-deadline timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility_timeout_secs: Option<u64>,
    /// AWS-specific settings, relevant when `backend = "sqs"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsBackendConfig>,
    /// GCP-specific settings, relevant when `backend = "google_pub_sub"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp: Option<GcpBackendConfig>,
    /// Redis-specific settings, relevant when `backend = "redis"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisBackendConfig>,
}

fn default_num_messages() -> u32 {
    10
}

impl Default for HedwigFileConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Mock,
            queue: "dev".into(),
            publisher: "hedwig".into(),
            log_level: Some("info".into()),
            validator: ValidatorSettings::default(),
            num_messages: default_num_messages(),
            visibility_timeout_secs: None,
            aws: None,
            gcp: None,
            redis: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum allowed visibility timeout in seconds (24 hours).
const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Threshold above which a timeout generates a warning.
const LARGE_TIMEOUT_THRESHOLD: u64 = 3_600;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`HedwigFileConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`HedwigFileConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<HedwigFileConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => HedwigFileConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`HedwigFileConfig`].
pub fn parse_toml(content: &str) -> Result<HedwigFileConfig, ConfigError> {
    toml::from_str::<HedwigFileConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `HEDWIG_QUEUE`
/// - `HEDWIG_PUBLISHER`
/// - `HEDWIG_LOG_LEVEL`
/// - `HEDWIG_NUM_MESSAGES`
/// - `HEDWIG_VISIBILITY_TIMEOUT_SECS`
/// - `HEDWIG_MAX_DELIVERY_ATTEMPTS` (Redis only; created lazily if absent)
pub fn apply_env_overrides(config: &mut HedwigFileConfig) {
    if let Ok(val) = std::env::var("HEDWIG_QUEUE") {
        config.queue = val;
    }
    if let Ok(val) = std::env::var("HEDWIG_PUBLISHER") {
        config.publisher = val;
    }
    if let Ok(val) = std::env::var("HEDWIG_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Ok(val) = std::env::var("HEDWIG_NUM_MESSAGES")
        && let Ok(n) = val.parse()
    {
        config.num_messages = n;
    }
    if let Ok(val) = std::env::var("HEDWIG_VISIBILITY_TIMEOUT_SECS")
        && let Ok(secs) = val.parse()
    {
        config.visibility_timeout_secs = Some(secs);
    }
    if let Ok(val) = std::env::var("HEDWIG_MAX_DELIVERY_ATTEMPTS")
        && let Ok(attempts) = val.parse()
    {
        config
            .redis
            .get_or_insert_with(RedisBackendConfig::default)
            .max_delivery_attempts = attempts;
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (empty queue name, out-of-range timeouts, missing
/// backend-specific settings) are returned as a
/// [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_config(config: &HedwigFileConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    if config.queue.trim().is_empty() {
        errors.push("queue must not be empty".into());
    }
    if config.publisher.trim().is_empty() {
        errors.push("publisher must not be empty".into());
    }
    if config.num_messages == 0 {
        errors.push("num_messages must be at least 1".into());
    }

    if let Some(secs) = config.visibility_timeout_secs {
        if secs == 0 || secs > MAX_TIMEOUT_SECS {
            errors.push(format!(
                "visibility_timeout_secs {secs} out of range (1..{MAX_TIMEOUT_SECS})"
            ));
        } else if secs > LARGE_TIMEOUT_THRESHOLD {
            warnings.push(ConfigWarning::LargeTimeout {
                setting: "visibility_timeout_secs".into(),
                secs,
            });
        }
    }

    if matches!(config.validator.format, WireFormat::JsonSchema) && config.validator.schema_root.is_none() {
        errors.push("validator.schema_root is required when format = \"json_schema\"".into());
    }

    match config.backend {
        BackendKind::GooglePubSub if config.gcp.as_ref().and_then(|g| g.project_id.as_ref()).is_none() => {
            errors.push("gcp.project_id is required when backend = \"google_pub_sub\"".into());
        }
        BackendKind::Redis if config.redis.is_none() => {
            warnings.push(ConfigWarning::MissingOptionalField {
                field: "redis".into(),
                hint: "falling back to redis://localhost:6379 with 5 max delivery attempts".into(),
            });
        }
        _ => {}
    }

    if config.visibility_timeout_secs.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "visibility_timeout_secs".into(),
            hint: "each backend's built-in default will be used".into(),
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values in `overlay` take precedence over `base`.
pub fn merge_configs(base: HedwigFileConfig, overlay: HedwigFileConfig) -> HedwigFileConfig {
    HedwigFileConfig {
        backend: overlay.backend,
        queue: overlay.queue,
        publisher: overlay.publisher,
        log_level: overlay.log_level.or(base.log_level),
        validator: overlay.validator,
        num_messages: overlay.num_messages,
        visibility_timeout_secs: overlay.visibility_timeout_secs.or(base.visibility_timeout_secs),
        aws: overlay.aws.or(base.aws),
        gcp: overlay.gcp.or(base.gcp),
        redis: overlay.redis.or(base.redis),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_toml() -> &'static str {
        r#"
            backend = "mock"
            queue = "trips"
            publisher = "trip-service"

            [validator]
            format = "json_schema"
            schema_root = "https://hedwig.example/schema.json"
        "#
    }

    #[test]
    fn default_config_is_valid_with_advisory_warnings() {
        let cfg = HedwigFileConfig {
            validator: ValidatorSettings {
                format: WireFormat::Protobuf,
                ..Default::default()
            },
            ..Default::default()
        };
        let warnings = validate_config(&cfg).expect("default config should be valid");
        assert!(!warnings.is_empty());
    }

    #[test]
    fn default_config_has_sensible_defaults() {
        let cfg = HedwigFileConfig::default();
        assert_eq!(cfg.log_level.as_deref(), Some("info"));
        assert_eq!(cfg.num_messages, 10);
        assert_eq!(cfg.backend, BackendKind::Mock);
    }

    #[test]
    fn parse_valid_toml_string() {
        let cfg = parse_toml(base_toml()).unwrap();
        assert_eq!(cfg.queue, "trips");
        assert_eq!(cfg.backend, BackendKind::Mock);
        assert_eq!(cfg.validator.format, WireFormat::JsonSchema);
    }

    #[test]
    fn parse_invalid_toml_gives_parse_error() {
        let bad = "this is [not valid toml =";
        let err = parse_toml(bad).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn validation_catches_invalid_log_level() {
        let mut cfg = parse_toml(base_toml()).unwrap();
        cfg.log_level = Some("verbose".into());
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn validation_requires_schema_root_for_json_schema() {
        let cfg = HedwigFileConfig {
            validator: ValidatorSettings {
                format: WireFormat::JsonSchema,
                schema_root: None,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("schema_root")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn validation_requires_gcp_project_for_pubsub_backend() {
        let cfg = HedwigFileConfig {
            backend: BackendKind::GooglePubSub,
            validator: ValidatorSettings {
                format: WireFormat::Protobuf,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("gcp.project_id")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn validation_catches_out_of_range_visibility_timeout() {
        let mut cfg = HedwigFileConfig {
            validator: ValidatorSettings {
                format: WireFormat::Protobuf,
                ..Default::default()
            },
            ..Default::default()
        };
        cfg.visibility_timeout_secs = Some(0);
        assert!(validate_config(&cfg).is_err());
        cfg.visibility_timeout_secs = Some(MAX_TIMEOUT_SECS + 1);
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn large_timeout_produces_warning() {
        let mut cfg = HedwigFileConfig {
            validator: ValidatorSettings {
                format: WireFormat::Protobuf,
                ..Default::default()
            },
            ..Default::default()
        };
        cfg.visibility_timeout_secs = Some(7200);
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.iter().any(|w| matches!(w, ConfigWarning::LargeTimeout { .. })));
    }

    #[test]
    fn merge_overlay_overrides_base() {
        let base = HedwigFileConfig {
            queue: "old".into(),
            ..Default::default()
        };
        let overlay = HedwigFileConfig {
            queue: "new".into(),
            ..Default::default()
        };
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.queue, "new");
    }

    #[test]
    fn merge_preserves_base_optional_field_when_overlay_absent() {
        let base = HedwigFileConfig {
            log_level: Some("debug".into()),
            ..Default::default()
        };
        let overlay = HedwigFileConfig {
            log_level: None,
            ..Default::default()
        };
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = parse_toml(base_toml()).unwrap();
        let serialized = toml::to_string(&cfg).unwrap();
        let deserialized: HedwigFileConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(cfg, deserialized);
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hedwig.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{}", base_toml()).unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.queue, "trips");
    }

    #[test]
    fn load_missing_file_gives_file_not_found() {
        let err = load_config(Some(Path::new("/nonexistent/hedwig.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn load_none_returns_default() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.backend, BackendKind::Mock);
    }

    #[test]
    #[allow(unsafe_code)]
    fn redis_env_override_creates_redis_config_lazily() {
        // SAFETY-equivalent note: tests run single-threaded w.r.t. env vars by
        // virtue of Cargo's default test harness isolation per binary; still,
        // guard with a unique var name to avoid cross-test interference.
        unsafe {
            std::env::set_var("HEDWIG_MAX_DELIVERY_ATTEMPTS", "7");
        }
        let mut cfg = HedwigFileConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.redis.unwrap().max_delivery_attempts, 7);
        unsafe {
            std::env::remove_var("HEDWIG_MAX_DELIVERY_ATTEMPTS");
        }
    }
}
