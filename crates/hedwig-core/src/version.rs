//! Schema version handling: `major.minor` message versions and the
//! `major.*` glob used to key routing and callback tables.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use hedwig_error::{ErrorCode, HedwigError};

/// A concrete `major.minor` schema version carried on a [`crate::Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct MessageVersion {
    /// Major version. Zero is invalid (see spec invariant on non-zero major).
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl MessageVersion {
    /// Construct a version, rejecting a zero major component.
    pub fn new(major: u32, minor: u32) -> Result<Self, HedwigError> {
        if major == 0 {
            return Err(HedwigError::new(
                ErrorCode::ValidationInvalidMessage,
                "message version major component must be non-zero",
            ));
        }
        Ok(Self { major, minor })
    }

    /// The `major.*` glob that this version's major component belongs to.
    pub fn as_glob(&self) -> MajorVersionGlob {
        MajorVersionGlob { major: self.major }
    }
}

impl fmt::Display for MessageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for MessageVersion {
    type Err = HedwigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major_s, minor_s) = s.split_once('.').ok_or_else(|| {
            HedwigError::new(
                ErrorCode::ValidationSchemaMismatch,
                format!("malformed version '{s}', expected 'major.minor'"),
            )
        })?;
        let major: u32 = major_s.parse().map_err(|_| {
            HedwigError::new(
                ErrorCode::ValidationSchemaMismatch,
                format!("non-numeric major version in '{s}'"),
            )
        })?;
        let minor: u32 = minor_s.parse().map_err(|_| {
            HedwigError::new(
                ErrorCode::ValidationSchemaMismatch,
                format!("non-numeric minor version in '{s}'"),
            )
        })?;
        Self::new(major, minor)
    }
}

/// A `major.*` glob, the granularity at which routing tables, callback
/// registries, and schema lookups are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct MajorVersionGlob {
    /// The fixed major component; minor is always `*`.
    pub major: u32,
}

impl MajorVersionGlob {
    /// Construct a glob for the given major version.
    pub fn new(major: u32) -> Self {
        Self { major }
    }

    /// True if `version`'s major component matches this glob.
    pub fn matches(&self, version: MessageVersion) -> bool {
        self.major == version.major
    }
}

impl fmt::Display for MajorVersionGlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.*", self.major)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_major() {
        assert!(MessageVersion::new(0, 1).is_err());
    }

    #[test]
    fn glob_matches_same_major_any_minor() {
        let glob = MajorVersionGlob::new(2);
        assert!(glob.matches(MessageVersion::new(2, 0).unwrap()));
        assert!(glob.matches(MessageVersion::new(2, 9).unwrap()));
        assert!(!glob.matches(MessageVersion::new(3, 0).unwrap()));
    }

    #[test]
    fn version_display_and_parse_roundtrip() {
        let v = MessageVersion::new(1, 5).unwrap();
        assert_eq!(v.to_string(), "1.5");
        assert_eq!(v.to_string().parse::<MessageVersion>().unwrap(), v);
    }
}
