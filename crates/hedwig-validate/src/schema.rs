//! Schema registries: per-`(type, major)` JSON-Schema validators or
//! Protobuf codec functions, plus the startup sanity check.

use std::collections::BTreeMap;

use hedwig_core::{MessageTypeRoute, MessageVersion};
use hedwig_error::{ErrorCode, HedwigError};

/// A compiled JSON-Schema entry for one `(type, major)` route.
pub struct JsonSchemaEntry {
    /// The declared minor version this schema subtree represents.
    pub minor: u32,
    /// Compiled validator for the `data` subtree.
    pub validator: jsonschema::Validator,
}

/// Registry of compiled JSON-Schema validators, keyed by route.
#[derive(Default)]
pub struct JsonSchemaRegistry {
    schema_root: String,
    entries: BTreeMap<MessageTypeRoute, JsonSchemaEntry>,
}

impl JsonSchemaRegistry {
    /// Start an empty registry rooted at `schema_root` (the JSON-Schema
    /// document's `id`).
    pub fn new(schema_root: impl Into<String>) -> Self {
        Self {
            schema_root: schema_root.into(),
            entries: BTreeMap::new(),
        }
    }

    /// The schema root this registry was constructed with.
    pub fn schema_root(&self) -> &str {
        &self.schema_root
    }

    /// Register a compiled schema for `(type, major)` at the given minor.
    pub fn register(
        &mut self,
        message_type: impl Into<String>,
        major: u32,
        minor: u32,
        subtree: &serde_json::Value,
    ) -> Result<(), HedwigError> {
        let route = MessageTypeRoute::new(message_type, major);
        let validator = jsonschema::validator_for(subtree).map_err(|e| {
            HedwigError::new(
                ErrorCode::SchemaMissingForRoute,
                format!("failed to compile schema for '{route}': {e}"),
            )
        })?;
        self.entries.insert(route, JsonSchemaEntry { minor, validator });
        Ok(())
    }

    /// Look up the compiled entry for a route.
    pub fn get(&self, route: &MessageTypeRoute) -> Option<&JsonSchemaEntry> {
        self.entries.get(route)
    }

    /// All routes this registry has a schema for.
    pub fn routes(&self) -> impl Iterator<Item = &MessageTypeRoute> {
        self.entries.keys()
    }
}

/// Decode a Protobuf payload into the opaque JSON-ish representation Hedwig
/// carries on [`hedwig_core::Message::data`].
pub type ProtoDecodeFn = Box<dyn Fn(&[u8]) -> Result<serde_json::Value, HedwigError> + Send + Sync>;
/// Encode the opaque payload back into Protobuf bytes.
pub type ProtoEncodeFn = Box<dyn Fn(&serde_json::Value) -> Result<Vec<u8>, HedwigError> + Send + Sync>;

/// A registered Protobuf class: its declared minor version and codec
/// functions. The generated protobuf message types themselves are
/// application-level and out of scope for this crate; callers register the
/// `prost`-backed encode/decode closures for their own types.
pub struct ProtoSchemaEntry {
    /// The declared minor version of this class.
    pub minor: u32,
    /// Decode bytes into the opaque payload representation.
    pub decode: ProtoDecodeFn,
    /// Encode the opaque payload representation back into bytes.
    pub encode: ProtoEncodeFn,
}

/// Registry of Protobuf codec functions, keyed by route.
#[derive(Default)]
pub struct ProtoRegistry {
    entries: BTreeMap<MessageTypeRoute, ProtoSchemaEntry>,
}

impl ProtoRegistry {
    /// Start an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Protobuf class for `(type, major)`.
    ///
    /// Fails with `SchemaAmbiguousRoute` if a class was already registered
    /// for this route — spec.md §4.1's "map unambiguously to some routed
    /// (type, major)" requirement.
    pub fn register(
        &mut self,
        message_type: impl Into<String>,
        major: u32,
        minor: u32,
        decode: ProtoDecodeFn,
        encode: ProtoEncodeFn,
    ) -> Result<(), HedwigError> {
        let route = MessageTypeRoute::new(message_type, major);
        if self.entries.contains_key(&route) {
            return Err(HedwigError::new(
                ErrorCode::SchemaAmbiguousRoute,
                format!("'{route}' already has a registered Protobuf class"),
            ));
        }
        self.entries.insert(route, ProtoSchemaEntry { minor, decode, encode });
        Ok(())
    }

    /// Look up the registered entry for a route.
    pub fn get(&self, route: &MessageTypeRoute) -> Option<&ProtoSchemaEntry> {
        self.entries.get(route)
    }

    /// All routes this registry has a class for.
    pub fn routes(&self) -> impl Iterator<Item = &MessageTypeRoute> {
        self.entries.keys()
    }
}

/// Either schema backend a [`crate::Validator`] is built on.
pub enum SchemaRegistry {
    /// JSON-Schema backed registry.
    JsonSchema(JsonSchemaRegistry),
    /// Protobuf-backed registry.
    Protobuf(ProtoRegistry),
}

impl SchemaRegistry {
    fn contains(&self, route: &MessageTypeRoute) -> bool {
        match self {
            Self::JsonSchema(r) => r.get(route).is_some(),
            Self::Protobuf(r) => r.get(route).is_some(),
        }
    }

    fn declared_minor(&self, route: &MessageTypeRoute) -> Option<u32> {
        match self {
            Self::JsonSchema(r) => r.get(route).map(|e| e.minor),
            Self::Protobuf(r) => r.get(route).map(|e| e.minor),
        }
    }

    /// Reject a producer's minor version that is newer than the schema's
    /// declared minor (spec §4.1 step 5 / serialization mirror).
    pub fn check_minor_known(&self, route: &MessageTypeRoute, version: MessageVersion) -> Result<(), HedwigError> {
        let declared = self.declared_minor(route).ok_or_else(|| {
            HedwigError::new(
                ErrorCode::ValidationUnknownType,
                format!("no schema registered for '{route}'"),
            )
        })?;
        if version.minor > declared {
            return Err(HedwigError::new(
                ErrorCode::ValidationUnknownMinorVersion,
                format!(
                    "'{route}' declares minor {declared} but message carries unknown minor {}",
                    version.minor
                ),
            )
            .with_context("declared_minor", declared)
            .with_context("message_minor", version.minor));
        }
        Ok(())
    }
}

/// Run the startup schema sanity check (spec §4.1): every reachable
/// `(type, major)` route must have a schema, emitting a `tracing` summary and
/// per-violation errors before raising.
pub fn check_schema_sanity(
    registry: &SchemaRegistry,
    reachable: impl IntoIterator<Item = MessageTypeRoute>,
) -> Result<(), HedwigError> {
    let reachable: Vec<MessageTypeRoute> = reachable.into_iter().collect();
    let mut missing = Vec::new();
    for route in &reachable {
        if !registry.contains(route) {
            tracing::error!(route = %route, "no schema registered for reachable route");
            missing.push(route.clone());
        }
    }
    tracing::info!(
        reachable = reachable.len(),
        validated = reachable.len() - missing.len(),
        "schema sanity check complete"
    );
    if missing.is_empty() {
        Ok(())
    } else {
        Err(HedwigError::new(
            ErrorCode::SchemaMissingForRoute,
            format!("{} route(s) reachable but missing a schema", missing.len()),
        )
        .with_context("routes", missing.iter().map(ToString::to_string).collect::<Vec<_>>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_schema_registry_compiles_and_looks_up() {
        let mut registry = JsonSchemaRegistry::new("https://hedwig.example/schema.json");
        registry
            .register("trip_created", 1, 0, &serde_json::json!({"type": "object"}))
            .unwrap();
        let route = MessageTypeRoute::new("trip_created", 1);
        assert!(registry.get(&route).is_some());
    }

    #[test]
    fn proto_registry_rejects_duplicate_route() {
        let mut registry = ProtoRegistry::new();
        registry
            .register(
                "trip_created",
                1,
                0,
                Box::new(|_| Ok(serde_json::Value::Null)),
                Box::new(|_| Ok(vec![])),
            )
            .unwrap();
        let err = registry
            .register(
                "trip_created",
                1,
                1,
                Box::new(|_| Ok(serde_json::Value::Null)),
                Box::new(|_| Ok(vec![])),
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SchemaAmbiguousRoute);
    }

    #[test]
    fn sanity_check_fails_on_missing_route() {
        let registry = SchemaRegistry::JsonSchema(JsonSchemaRegistry::new("root"));
        let err = check_schema_sanity(&registry, [MessageTypeRoute::new("trip_created", 1)]).unwrap_err();
        assert_eq!(err.code, ErrorCode::SchemaMissingForRoute);
    }

    #[test]
    fn sanity_check_passes_when_all_reachable_routes_covered() {
        let mut r = JsonSchemaRegistry::new("root");
        r.register("trip_created", 1, 0, &serde_json::json!({"type": "object"}))
            .unwrap();
        let registry = SchemaRegistry::JsonSchema(r);
        check_schema_sanity(&registry, [MessageTypeRoute::new("trip_created", 1)]).unwrap();
    }

    #[test]
    fn check_minor_known_rejects_newer_minor_than_declared() {
        let mut r = JsonSchemaRegistry::new("root");
        r.register("trip_created", 1, 2, &serde_json::json!({"type": "object"}))
            .unwrap();
        let registry = SchemaRegistry::JsonSchema(r);
        let route = MessageTypeRoute::new("trip_created", 1);
        registry.check_minor_known(&route, MessageVersion::new(1, 2).unwrap()).unwrap();
        let err = registry
            .check_minor_known(&route, MessageVersion::new(1, 3).unwrap())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationUnknownMinorVersion);
    }
}
