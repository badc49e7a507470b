//! Ontology Registry
//!
//! Maps ontology tags to structural schemas. Registration is append-only and
//! serialized behind a write lock; lookups take a shared read lock and can run
//! concurrently once the registry is populated.
//!
//! The registry is an explicit object: create one at startup, populate it,
//! and share it (typically as `Arc<OntologyRegistry>`) with query and write
//! code. Tests build fresh registries instead of sharing process state.

use std::collections::BTreeMap;
use std::sync::Arc;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{OntologyError, Result};
use crate::field::{FieldNode, PathRoot};
use crate::ontology::Ontology;
use crate::schema::{
    validate_tag, OntologyDefinition, SchemaEntry, SerializationFormat, StructuralSchema,
    TypeMarker,
};

/// The ontology registry
#[derive(Debug, Default)]
pub struct OntologyRegistry {
    entries: RwLock<BTreeMap<String, Arc<SchemaEntry>>>,
}

impl OntologyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in sensor ontologies
    pub fn with_builtins() -> Result<Self> {
        let registry = Self::new();
        crate::ontology::register_builtins(&registry)?;
        Ok(registry)
    }

    /// Register a tag.
    ///
    /// Fails if the tag is taken or the schema is not representable. Once
    /// registered, an entry is never modified.
    pub fn register(
        &self,
        tag: &str,
        schema: StructuralSchema,
        serialization_format: SerializationFormat,
        marker: TypeMarker,
    ) -> Result<()> {
        validate_tag(tag)?;
        schema.validate(tag)?;

        let mut entries = self.entries.write();
        if entries.contains_key(tag) {
            return Err(OntologyError::DuplicateTag {
                tag: tag.to_string(),
            });
        }

        let entry = SchemaEntry::new(tag, schema, serialization_format, marker);
        debug!(
            tag,
            fields = entry.schema.len(),
            serialization = entry.serialization_format.as_str(),
            fingerprint = entry.fingerprint.short(),
            "registered ontology"
        );
        entries.insert(tag.to_string(), Arc::new(entry));
        Ok(())
    }

    /// Register a native Rust ontology type
    pub fn register_type<T: Ontology>(&self) -> Result<()> {
        self.register(T::TAG, T::schema(), T::FORMAT, TypeMarker::of::<T>())
    }

    /// Register a definition loaded from a file.
    ///
    /// The entry's marker is derived from the definition's fingerprint; fetch
    /// it with [`OntologyRegistry::resolve`] to open writers for the tag.
    pub fn register_definition(&self, definition: OntologyDefinition) -> Result<()> {
        let marker = TypeMarker::definition(&definition.tag, definition.fingerprint());
        self.register(
            &definition.tag,
            definition.fields,
            definition.serialization_format,
            marker,
        )
    }

    /// Whether a tag is registered
    pub fn is_registered(&self, tag: &str) -> bool {
        self.entries.read().contains_key(tag)
    }

    /// Get an entry, or `None` if absent
    pub fn get(&self, tag: &str) -> Option<Arc<SchemaEntry>> {
        self.entries.read().get(tag).cloned()
    }

    /// Get an entry, failing if the tag is unknown
    pub fn resolve(&self, tag: &str) -> Result<Arc<SchemaEntry>> {
        self.get(tag).ok_or_else(|| OntologyError::UnknownTag {
            tag: tag.to_string(),
        })
    }

    /// Resolve a tag for writing: the caller must hold the registered marker
    pub fn resolve_for_write(&self, tag: &str, marker: &TypeMarker) -> Result<Arc<SchemaEntry>> {
        let entry = self.get(tag).ok_or_else(|| OntologyError::UnregisteredType {
            tag: tag.to_string(),
        })?;
        if &entry.marker != marker {
            return Err(OntologyError::NotSerializable {
                tag: tag.to_string(),
                type_name: marker.type_name(),
            });
        }
        Ok(entry)
    }

    /// Remove a tag. Intended for tests and tooling.
    pub fn unregister(&self, tag: &str) -> Option<Arc<SchemaEntry>> {
        let removed = self.entries.write().remove(tag);
        if removed.is_some() {
            debug!(tag, "unregistered ontology");
        }
        removed
    }

    /// All registered tags, sorted
    pub fn tags(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Root field accessor for a registered tag
    pub fn q(&self, tag: &str) -> Result<FieldNode> {
        let entry = self.resolve(tag)?;
        Ok(FieldNode::root(
            PathRoot::Ontology(entry.tag.clone()),
            &entry.schema,
        ))
    }

    /// Search tags by name (fuzzy), best match first
    pub fn search(&self, query: &str, limit: usize) -> Vec<String> {
        let matcher = SkimMatcherV2::default();
        let entries = self.entries.read();
        let mut results: Vec<(i64, &String)> = entries
            .keys()
            .filter_map(|tag| matcher.fuzzy_match(tag, query).map(|score| (score, tag)))
            .collect();

        // Sort by score descending, then by tag for stable output
        results.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        results
            .into_iter()
            .take(limit)
            .map(|(_, tag)| tag.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, Field};

    fn sensor_schema() -> StructuralSchema {
        StructuralSchema::new(vec![Field::new("field", DataType::Float32)])
    }

    struct RegisteredSensor;
    struct LookalikeSensor;

    #[test]
    fn test_create_registry() {
        let registry = OntologyRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.is_registered("imu"));
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = OntologyRegistry::new();
        registry
            .register(
                "registered_sensor",
                sensor_schema(),
                SerializationFormat::Default,
                TypeMarker::of::<RegisteredSensor>(),
            )
            .unwrap();

        assert!(registry.is_registered("registered_sensor"));
        let entry = registry.resolve("registered_sensor").unwrap();
        assert_eq!(entry.tag, "registered_sensor");
        assert_eq!(entry.serialization_format, SerializationFormat::Default);
        assert_eq!(entry.schema, sensor_schema());
    }

    #[test]
    fn test_duplicate_tag() {
        let registry = OntologyRegistry::new();
        let marker = TypeMarker::of::<RegisteredSensor>();
        registry
            .register("sensor", sensor_schema(), SerializationFormat::Default, marker.clone())
            .unwrap();

        let result = registry.register("sensor", sensor_schema(), SerializationFormat::Ragged, marker);
        assert!(matches!(result, Err(OntologyError::DuplicateTag { .. })));

        // The first registration is untouched
        assert!(registry.is_registered("sensor"));
        assert_eq!(
            registry.resolve("sensor").unwrap().serialization_format,
            SerializationFormat::Default
        );
    }

    #[test]
    fn test_invalid_schema_not_registered() {
        let registry = OntologyRegistry::new();
        let result = registry.register(
            "empty",
            StructuralSchema::default(),
            SerializationFormat::Default,
            TypeMarker::of::<RegisteredSensor>(),
        );
        assert!(matches!(result, Err(OntologyError::InvalidSchema { .. })));
        assert!(!registry.is_registered("empty"));
    }

    #[test]
    fn test_unknown_tag() {
        let registry = OntologyRegistry::new();
        assert!(matches!(registry.resolve("nope"), Err(OntologyError::UnknownTag { .. })));
        assert!(matches!(registry.q("nope"), Err(OntologyError::UnknownTag { .. })));
    }

    #[test]
    fn test_write_resolution_is_nominal() {
        let registry = OntologyRegistry::new();
        registry
            .register(
                "sensor",
                sensor_schema(),
                SerializationFormat::Default,
                TypeMarker::of::<RegisteredSensor>(),
            )
            .unwrap();

        assert!(registry
            .resolve_for_write("sensor", &TypeMarker::of::<RegisteredSensor>())
            .is_ok());
        assert!(matches!(
            registry.resolve_for_write("sensor", &TypeMarker::of::<LookalikeSensor>()),
            Err(OntologyError::NotSerializable { .. })
        ));
        assert!(matches!(
            registry.resolve_for_write("other", &TypeMarker::of::<RegisteredSensor>()),
            Err(OntologyError::UnregisteredType { .. })
        ));
    }

    #[test]
    fn test_definition_markers() {
        let registry = OntologyRegistry::new();
        let def = OntologyDefinition {
            tag: "sensor".into(),
            serialization_format: SerializationFormat::Ragged,
            fields: sensor_schema(),
        };
        registry.register_definition(def.clone()).unwrap();

        let entry = registry.resolve("sensor").unwrap();
        assert_eq!(entry.fingerprint, def.fingerprint());
        assert!(registry.resolve_for_write("sensor", &entry.marker).is_ok());
        assert!(registry
            .resolve_for_write("sensor", &TypeMarker::of::<RegisteredSensor>())
            .is_err());
    }

    #[test]
    fn test_unregister() {
        let registry = OntologyRegistry::new();
        registry
            .register(
                "sensor",
                sensor_schema(),
                SerializationFormat::Default,
                TypeMarker::of::<RegisteredSensor>(),
            )
            .unwrap();
        assert!(registry.unregister("sensor").is_some());
        assert!(!registry.is_registered("sensor"));
        assert!(registry.unregister("sensor").is_none());
    }

    #[test]
    fn test_search() {
        let registry = OntologyRegistry::with_builtins().unwrap();
        let hits = registry.search("magn", 5);
        assert_eq!(hits.first().map(String::as_str), Some("magnetometer"));
        assert!(registry.search("zzzz", 5).is_empty());
    }

    #[test]
    fn test_concurrent_reads() {
        let registry = Arc::new(OntologyRegistry::with_builtins().unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(registry.is_registered("imu"));
                        assert!(registry.resolve("gps").is_ok());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
