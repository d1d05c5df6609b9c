//! Unified error taxonomy with stable error codes for Hedwig.
//!
//! Every Hedwig error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, an optional cause chain, and
//! arbitrary key-value context ("extra", in the language of spec §7). Use
//! [`HedwigError::new`] to construct one fluently.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Message validation / serialization errors.
    Validation,
    /// Schema construction/sanity-check errors.
    Schema,
    /// Callback registry errors.
    Callback,
    /// Transport backend errors (SQS, Pub/Sub, Redis).
    Backend,
    /// Configuration errors.
    Config,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Schema => "schema",
            Self::Callback => "callback",
            Self::Backend => "backend",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Validation --
    /// Envelope failed to parse or has missing/invalid fields.
    ValidationInvalidEnvelope,
    /// A header key used the reserved `hedwig_` namespace.
    ValidationReservedHeader,
    /// A header key or value was not a string.
    ValidationNonStringHeader,
    /// The schema identifier did not match the configured root or could not be parsed.
    ValidationSchemaMismatch,
    /// The `(type, major)` pair is not registered with any known schema.
    ValidationUnknownType,
    /// The producer's minor version is newer than what this consumer knows.
    ValidationUnknownMinorVersion,
    /// Payload failed to decode under the selected wire format.
    ValidationDecodeFailed,
    /// Message failed a structural invariant (empty id/type, zero major, bad timestamp).
    ValidationInvalidMessage,

    // -- Schema --
    /// A routed/callback-registered `(type, major)` has no corresponding schema.
    SchemaMissingForRoute,
    /// A declared schema class does not map unambiguously to a routed `(type, major)`.
    SchemaAmbiguousRoute,

    // -- Callback --
    /// No handler registered for `(type, major)`.
    CallbackNotFound,
    /// A callback was registered twice with conflicting handlers.
    CallbackConflict,
    /// A callback's signature did not satisfy the registration contract.
    CallbackInvalidSignature,

    // -- Backend --
    /// Requested backend name does not exist / is unsupported.
    BackendNotFound,
    /// The backend RPC timed out.
    BackendTimeout,
    /// The transport returned a partial failure for a batch operation.
    BackendPartialFailure,
    /// The visibility timeout extension request was rejected (out of range / mismatch).
    BackendVisibilityTimeoutInvalid,
    /// The backend transport returned an unrecoverable error.
    BackendTransportFailed,

    // -- Config --
    /// Configuration file or value is invalid.
    ConfigInvalid,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationInvalidEnvelope
            | Self::ValidationReservedHeader
            | Self::ValidationNonStringHeader
            | Self::ValidationSchemaMismatch
            | Self::ValidationUnknownType
            | Self::ValidationUnknownMinorVersion
            | Self::ValidationDecodeFailed
            | Self::ValidationInvalidMessage => ErrorCategory::Validation,

            Self::SchemaMissingForRoute | Self::SchemaAmbiguousRoute => ErrorCategory::Schema,

            Self::CallbackNotFound | Self::CallbackConflict | Self::CallbackInvalidSignature => {
                ErrorCategory::Callback
            }

            Self::BackendNotFound
            | Self::BackendTimeout
            | Self::BackendPartialFailure
            | Self::BackendVisibilityTimeoutInvalid
            | Self::BackendTransportFailed => ErrorCategory::Backend,

            Self::ConfigInvalid => ErrorCategory::Config,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"VALIDATION_RESERVED_HEADER"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationInvalidEnvelope => "VALIDATION_INVALID_ENVELOPE",
            Self::ValidationReservedHeader => "VALIDATION_RESERVED_HEADER",
            Self::ValidationNonStringHeader => "VALIDATION_NON_STRING_HEADER",
            Self::ValidationSchemaMismatch => "VALIDATION_SCHEMA_MISMATCH",
            Self::ValidationUnknownType => "VALIDATION_UNKNOWN_TYPE",
            Self::ValidationUnknownMinorVersion => "VALIDATION_UNKNOWN_MINOR_VERSION",
            Self::ValidationDecodeFailed => "VALIDATION_DECODE_FAILED",
            Self::ValidationInvalidMessage => "VALIDATION_INVALID_MESSAGE",
            Self::SchemaMissingForRoute => "SCHEMA_MISSING_FOR_ROUTE",
            Self::SchemaAmbiguousRoute => "SCHEMA_AMBIGUOUS_ROUTE",
            Self::CallbackNotFound => "CALLBACK_NOT_FOUND",
            Self::CallbackConflict => "CALLBACK_CONFLICT",
            Self::CallbackInvalidSignature => "CALLBACK_INVALID_SIGNATURE",
            Self::BackendNotFound => "BACKEND_NOT_FOUND",
            Self::BackendTimeout => "BACKEND_TIMEOUT",
            Self::BackendPartialFailure => "BACKEND_PARTIAL_FAILURE",
            Self::BackendVisibilityTimeoutInvalid => "BACKEND_VISIBILITY_TIMEOUT_INVALID",
            Self::BackendTransportFailed => "BACKEND_TRANSPORT_FAILED",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HedwigError
// ---------------------------------------------------------------------------

/// Unified Hedwig error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context (the
/// `extra` map referenced by spec §7's `LoggingException`).
///
/// # Builder usage
///
/// ```
/// use hedwig_error::{HedwigError, ErrorCode};
///
/// let err = HedwigError::new(ErrorCode::BackendTimeout, "timed out after 30 s")
///     .with_context("backend", "sqs")
///     .with_context("timeout_ms", 30_000);
/// ```
pub struct HedwigError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics (the "extra" map).
    pub context: BTreeMap<String, serde_json::Value>,
}

impl HedwigError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for HedwigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("HedwigError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for HedwigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for HedwigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`HedwigError`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HedwigErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&HedwigError> for HedwigErrorDto {
    fn from(err: &HedwigError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<HedwigErrorDto> for HedwigError {
    fn from(dto: HedwigErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::ValidationInvalidEnvelope,
        ErrorCode::ValidationReservedHeader,
        ErrorCode::ValidationNonStringHeader,
        ErrorCode::ValidationSchemaMismatch,
        ErrorCode::ValidationUnknownType,
        ErrorCode::ValidationUnknownMinorVersion,
        ErrorCode::ValidationDecodeFailed,
        ErrorCode::ValidationInvalidMessage,
        ErrorCode::SchemaMissingForRoute,
        ErrorCode::SchemaAmbiguousRoute,
        ErrorCode::CallbackNotFound,
        ErrorCode::CallbackConflict,
        ErrorCode::CallbackInvalidSignature,
        ErrorCode::BackendNotFound,
        ErrorCode::BackendTimeout,
        ErrorCode::BackendPartialFailure,
        ErrorCode::BackendVisibilityTimeoutInvalid,
        ErrorCode::BackendTransportFailed,
        ErrorCode::ConfigInvalid,
        ErrorCode::Internal,
    ];

    #[test]
    fn basic_construction() {
        let err = HedwigError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = HedwigError::new(ErrorCode::BackendNotFound, "no such backend");
        assert_eq!(err.to_string(), "[BACKEND_NOT_FOUND] no such backend");
    }

    #[test]
    fn display_with_context() {
        let err = HedwigError::new(ErrorCode::BackendTimeout, "timed out")
            .with_context("timeout_ms", 5000);
        let s = err.to_string();
        assert!(s.starts_with("[BACKEND_TIMEOUT] timed out"));
        assert!(s.contains("timeout_ms"));
        assert!(s.contains("5000"));
    }

    #[test]
    fn with_source_chains_correctly() {
        use std::io;
        let io_err = io::Error::new(io::ErrorKind::Other, "disk full");
        let err = HedwigError::new(ErrorCode::Internal, "failed to persist").with_source(io_err);
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(std::error::Error::source(&err).unwrap().to_string(), "disk full");
    }

    #[test]
    fn every_code_has_stable_str_and_roundtrips_category() {
        for code in ALL_CODES {
            let s = code.as_str();
            assert_eq!(s, s.to_uppercase(), "{code:?} should be SCREAMING_SNAKE_CASE");
            let _ = code.category();
        }
    }

    #[test]
    fn codes_serialize_to_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::ValidationReservedHeader).unwrap();
        assert_eq!(json, "\"VALIDATION_RESERVED_HEADER\"");
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorCode::ValidationReservedHeader);
    }

    #[test]
    fn dto_roundtrip_drops_source_but_keeps_message() {
        use std::io;
        let err = HedwigError::new(ErrorCode::BackendTransportFailed, "send failed")
            .with_context("retries", 3)
            .with_source(io::Error::new(io::ErrorKind::Other, "connection reset"));
        let dto = HedwigErrorDto::from(&err);
        assert_eq!(dto.code, ErrorCode::BackendTransportFailed);
        assert_eq!(dto.source_message.as_deref(), Some("connection reset"));

        let json = serde_json::to_string(&dto).unwrap();
        let back: HedwigErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dto);

        let reconstructed: HedwigError = back.into();
        assert!(reconstructed.source.is_none());
        assert_eq!(reconstructed.context.get("retries").unwrap(), &serde_json::Value::from(3));
    }

    #[test]
    fn category_groups_are_exhaustive_and_stable() {
        assert_eq!(ErrorCode::CallbackNotFound.category(), ErrorCategory::Callback);
        assert_eq!(ErrorCode::BackendPartialFailure.category(), ErrorCategory::Backend);
        assert_eq!(ErrorCode::SchemaAmbiguousRoute.category(), ErrorCategory::Schema);
        assert_eq!(ErrorCode::ConfigInvalid.category(), ErrorCategory::Config);
    }
}
