//! Structural schema types and registry entries

use std::any::TypeId;
use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::checksum::Checksum;
use crate::error::{OntologyError, Result};

/// Column name prepended to every batch row; reserved at the schema root.
pub const TIMESTAMP_FIELD: &str = "timestamp_ns";

/// Supported primitive and nested column types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    String,
    LargeString,
    Binary,
    /// Nanoseconds since the Unix epoch
    Timestamp,
    List(Box<DataType>),
    Struct(Vec<Field>),
    /// String-keyed map; keys are caller-defined metadata
    Map(Box<DataType>),
    /// Heterogeneous scalar, only legal as a map value
    Variant,
}

impl DataType {
    pub fn list(items: DataType) -> Self {
        DataType::List(Box::new(items))
    }

    pub fn map(values: DataType) -> Self {
        DataType::Map(Box::new(values))
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::Uint8
                | DataType::Uint16
                | DataType::Uint32
                | DataType::Uint64
                | DataType::Timestamp
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_string(&self) -> bool {
        matches!(self, DataType::String | DataType::LargeString)
    }

    /// Scalars are the leaf types predicates can target
    pub fn is_scalar(&self) -> bool {
        self.is_numeric() || self.is_string() || matches!(self, DataType::Boolean)
    }

    /// Fixed byte width of the column value, if any
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            DataType::Boolean | DataType::Int8 | DataType::Uint8 => Some(1),
            DataType::Int16 | DataType::Uint16 => Some(2),
            DataType::Int32 | DataType::Uint32 | DataType::Float32 => Some(4),
            DataType::Int64 | DataType::Uint64 | DataType::Float64 | DataType::Timestamp => Some(8),
            _ => None,
        }
    }

    /// Short human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Uint8 => "uint8",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::String => "string",
            DataType::LargeString => "large_string",
            DataType::Binary => "binary",
            DataType::Timestamp => "timestamp",
            DataType::List(_) => "list",
            DataType::Struct(_) => "struct",
            DataType::Map(_) => "map",
            DataType::Variant => "variant",
        }
    }

    /// Integer bounds for range checks of incoming records
    fn integer_bounds(&self) -> Option<(i128, i128)> {
        match self {
            DataType::Int8 => Some((i8::MIN as i128, i8::MAX as i128)),
            DataType::Int16 => Some((i16::MIN as i128, i16::MAX as i128)),
            DataType::Int32 => Some((i32::MIN as i128, i32::MAX as i128)),
            DataType::Int64 | DataType::Timestamp => Some((i64::MIN as i128, i64::MAX as i128)),
            DataType::Uint8 => Some((0, u8::MAX as i128)),
            DataType::Uint16 => Some((0, u16::MAX as i128)),
            DataType::Uint32 => Some((0, u32::MAX as i128)),
            DataType::Uint64 => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::List(items) => write!(f, "list<{}>", items),
            DataType::Map(values) => write!(f, "map<string, {}>", values),
            other => f.write_str(other.name()),
        }
    }
}

/// A single named column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Shorthand for a nested struct field
    pub fn structure(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self::new(name, DataType::Struct(fields))
    }
}

/// Ordered field definitions describing a record's shape
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuralSchema {
    pub fields: Vec<Field>,
}

impl StructuralSchema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check that every field is representable in the supported type set
    pub fn validate(&self, tag: &str) -> Result<()> {
        if self.fields.is_empty() {
            return Err(OntologyError::invalid_schema(tag, "schema has no fields"));
        }
        if self.field(TIMESTAMP_FIELD).is_some() {
            return Err(OntologyError::invalid_schema(
                tag,
                format!("'{}' is reserved", TIMESTAMP_FIELD),
            ));
        }
        validate_fields(tag, "", &self.fields)
    }

    /// Check a single record (a JSON object) against this schema
    pub fn validate_record(&self, tag: &str, record: &Json) -> Result<()> {
        check_struct(tag, "", &self.fields, record)
    }

    /// Every leaf path, dotted, with its type. Map nodes are listed as leaves.
    pub fn leaf_paths(&self) -> Vec<(String, &DataType)> {
        let mut out = Vec::new();
        collect_leaves("", &self.fields, &mut out);
        out
    }
}

fn collect_leaves<'a>(prefix: &str, fields: &'a [Field], out: &mut Vec<(String, &'a DataType)>) {
    for field in fields {
        let path = join_path(prefix, &field.name);
        match &field.data_type {
            DataType::Struct(children) => collect_leaves(&path, children, out),
            other => out.push((path, other)),
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"))
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid tag regex"))
}

/// Ontology tags are lowercase snake_case identifiers
pub fn validate_tag(tag: &str) -> Result<()> {
    if !tag_pattern().is_match(tag) {
        return Err(OntologyError::invalid_schema(
            tag,
            "tag must be a lowercase snake_case identifier",
        ));
    }
    Ok(())
}

fn validate_fields(tag: &str, prefix: &str, fields: &[Field]) -> Result<()> {
    for (i, field) in fields.iter().enumerate() {
        let path = join_path(prefix, &field.name);
        if !identifier_pattern().is_match(&field.name) {
            return Err(OntologyError::invalid_schema(
                tag,
                format!("invalid field name '{}'", path),
            ));
        }
        if fields[..i].iter().any(|f| f.name == field.name) {
            return Err(OntologyError::invalid_schema(
                tag,
                format!("duplicate field '{}'", path),
            ));
        }
        validate_type(tag, &path, &field.data_type)?;
    }
    Ok(())
}

fn validate_type(tag: &str, path: &str, data_type: &DataType) -> Result<()> {
    match data_type {
        DataType::Struct(children) => {
            if children.is_empty() {
                return Err(OntologyError::invalid_schema(
                    tag,
                    format!("struct '{}' has no fields", path),
                ));
            }
            validate_fields(tag, path, children)
        }
        DataType::List(items) => match items.as_ref() {
            DataType::Map(_) | DataType::Variant => Err(OntologyError::invalid_schema(
                tag,
                format!("list '{}' cannot hold {}", path, items.name()),
            )),
            other => validate_type(tag, path, other),
        },
        DataType::Map(values) => {
            if values.is_scalar() || matches!(values.as_ref(), DataType::Variant) {
                Ok(())
            } else {
                Err(OntologyError::invalid_schema(
                    tag,
                    format!("map '{}' values must be scalar, got {}", path, values),
                ))
            }
        }
        DataType::Variant => Err(OntologyError::invalid_schema(
            tag,
            format!("'{}': variant is only allowed as a map value", path),
        )),
        _ => Ok(()),
    }
}

fn mismatch(tag: &str, path: &str, reason: impl Into<String>) -> OntologyError {
    OntologyError::SchemaMismatch {
        tag: tag.to_string(),
        path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
        reason: reason.into(),
    }
}

fn check_struct(tag: &str, prefix: &str, fields: &[Field], value: &Json) -> Result<()> {
    let object = value
        .as_object()
        .ok_or_else(|| mismatch(tag, prefix, "expected an object"))?;

    for key in object.keys() {
        if !fields.iter().any(|f| &f.name == key) {
            return Err(mismatch(tag, &join_path(prefix, key), "unexpected field"));
        }
    }

    for field in fields {
        let path = join_path(prefix, &field.name);
        match object.get(&field.name) {
            None | Some(Json::Null) => {
                if !field.nullable {
                    return Err(mismatch(tag, &path, "missing non-nullable field"));
                }
            }
            Some(v) => check_value(tag, &path, &field.data_type, v)?,
        }
    }
    Ok(())
}

fn check_value(tag: &str, path: &str, data_type: &DataType, value: &Json) -> Result<()> {
    let expected = || mismatch(tag, path, format!("expected {}", data_type));
    match data_type {
        DataType::Boolean => value.as_bool().map(|_| ()).ok_or_else(expected),
        DataType::Float32 | DataType::Float64 => value.as_f64().map(|_| ()).ok_or_else(expected),
        DataType::String | DataType::LargeString => value.as_str().map(|_| ()).ok_or_else(expected),
        DataType::Binary => match value {
            Json::String(_) => Ok(()),
            Json::Array(items) if items.iter().all(|b| b.as_u64().map_or(false, |b| b <= 255)) => Ok(()),
            _ => Err(expected()),
        },
        DataType::List(items) => {
            let array = value.as_array().ok_or_else(expected)?;
            for (i, item) in array.iter().enumerate() {
                check_value(tag, &format!("{}[{}]", path, i), items, item)?;
            }
            Ok(())
        }
        DataType::Struct(children) => check_struct(tag, path, children, value),
        DataType::Map(values) => {
            let object = value.as_object().ok_or_else(expected)?;
            for (key, item) in object {
                check_value(tag, &format!("{}[{}]", path, key), values, item)?;
            }
            Ok(())
        }
        DataType::Variant => match value {
            Json::Bool(_) | Json::Number(_) | Json::String(_) => Ok(()),
            _ => Err(expected()),
        },
        integer => {
            let (min, max) = integer.integer_bounds().ok_or_else(expected)?;
            let n = value
                .as_i64()
                .map(i128::from)
                .or_else(|| value.as_u64().map(i128::from))
                .ok_or_else(expected)?;
            if n < min || n > max {
                return Err(mismatch(tag, path, format!("{} out of range for {}", n, integer)));
            }
            Ok(())
        }
    }
}

/// On-disk serialization mode of a topic's columnar data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationFormat {
    /// Fixed-width columnar data
    #[default]
    Default,
    /// Variable-length, nested or list-like data
    Ragged,
    /// Large binary image payloads
    Image,
}

impl SerializationFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerializationFormat::Default => "default",
            SerializationFormat::Ragged => "ragged",
            SerializationFormat::Image => "image",
        }
    }
}

/// Registration capability attached to a tag.
///
/// The write path compares markers nominally: a type carrying the same tag
/// and field names as a registered one is still rejected unless it is the
/// exact registered type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeMarker {
    /// A native Rust type
    Native {
        type_id: TypeId,
        type_name: &'static str,
    },
    /// A type loaded from a definitions file
    Definition { tag: String, fingerprint: Checksum },
}

impl TypeMarker {
    pub fn of<T: 'static>() -> Self {
        TypeMarker::Native {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub(crate) fn definition(tag: &str, fingerprint: Checksum) -> Self {
        TypeMarker::Definition {
            tag: tag.to_string(),
            fingerprint,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            TypeMarker::Native { type_name, .. } => (*type_name).to_string(),
            TypeMarker::Definition { tag, fingerprint } => {
                format!("{}@{}", tag, fingerprint.short())
            }
        }
    }
}

/// Serializable ontology definition, as written in definition files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyDefinition {
    pub tag: String,
    #[serde(default)]
    pub serialization_format: SerializationFormat,
    pub fields: StructuralSchema,
}

impl OntologyDefinition {
    /// Fingerprint over the structural schema and serialization mode
    pub fn fingerprint(&self) -> Checksum {
        Checksum::from_serialize(&(&self.serialization_format, &self.fields))
    }
}

/// A registered ontology in the registry
#[derive(Debug, Clone)]
pub struct SchemaEntry {
    /// Unique ontology tag (e.g., "imu")
    pub tag: String,
    /// Structural schema of the payload
    pub schema: StructuralSchema,
    /// Serialization mode requested for topics of this type
    pub serialization_format: SerializationFormat,
    /// Capability marker of the owning type
    pub marker: TypeMarker,
    /// SHA256 fingerprint of schema and serialization mode
    pub fingerprint: Checksum,
    /// When this entry was registered
    pub registered_at: DateTime<Utc>,
}

impl SchemaEntry {
    pub fn new(
        tag: impl Into<String>,
        schema: StructuralSchema,
        serialization_format: SerializationFormat,
        marker: TypeMarker,
    ) -> Self {
        let tag = tag.into();
        let fingerprint = Checksum::from_serialize(&(&serialization_format, &schema));
        Self {
            tag,
            schema,
            serialization_format,
            marker,
            fingerprint,
            registered_at: Utc::now(),
        }
    }

    /// Export back to the serializable definition form
    pub fn definition(&self) -> OntologyDefinition {
        OntologyDefinition {
            tag: self.tag.clone(),
            serialization_format: self.serialization_format,
            fields: self.schema.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn imu_schema() -> StructuralSchema {
        StructuralSchema::new(vec![
            Field::structure(
                "acceleration",
                vec![
                    Field::new("x", DataType::Float64),
                    Field::new("y", DataType::Float64),
                    Field::new("z", DataType::Float64),
                ],
            ),
            Field::new("frame_id", DataType::String).nullable(),
        ])
    }

    #[test]
    fn test_valid_schema() {
        assert!(imu_schema().validate("imu").is_ok());
    }

    #[test]
    fn test_empty_schema_rejected() {
        let err = StructuralSchema::default().validate("empty").unwrap_err();
        assert!(matches!(err, OntologyError::InvalidSchema { .. }));
    }

    #[test]
    fn test_unrepresentable_types_rejected() {
        let nested_map = StructuralSchema::new(vec![Field::new(
            "meta",
            DataType::map(DataType::map(DataType::String)),
        )]);
        assert!(nested_map.validate("t").is_err());

        let bare_variant = StructuralSchema::new(vec![Field::new("v", DataType::Variant)]);
        assert!(bare_variant.validate("t").is_err());

        let empty_struct = StructuralSchema::new(vec![Field::structure("s", vec![])]);
        assert!(empty_struct.validate("t").is_err());

        let reserved = StructuralSchema::new(vec![Field::new(TIMESTAMP_FIELD, DataType::Int64)]);
        assert!(reserved.validate("t").is_err());

        let dotted = StructuralSchema::new(vec![Field::new("a.b", DataType::Int64)]);
        assert!(dotted.validate("t").is_err());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let schema = StructuralSchema::new(vec![
            Field::new("x", DataType::Float32),
            Field::new("x", DataType::Float64),
        ]);
        assert!(schema.validate("t").is_err());
    }

    #[test]
    fn test_tag_validation() {
        assert!(validate_tag("imu").is_ok());
        assert!(validate_tag("registered_sensor").is_ok());
        assert!(validate_tag("").is_err());
        assert!(validate_tag("Imu").is_err());
        assert!(validate_tag("imu/front").is_err());
    }

    #[test]
    fn test_record_validation() {
        let schema = imu_schema();
        let ok = json!({"acceleration": {"x": 1.0, "y": 0, "z": -2.5}});
        assert!(schema.validate_record("imu", &ok).is_ok());

        let missing = json!({"acceleration": {"x": 1.0, "y": 0.0}});
        assert!(matches!(
            schema.validate_record("imu", &missing),
            Err(OntologyError::SchemaMismatch { ref path, .. }) if path == "acceleration.z"
        ));

        let wrong_type = json!({"acceleration": {"x": "fast", "y": 0.0, "z": 0.0}});
        assert!(schema.validate_record("imu", &wrong_type).is_err());

        let extra = json!({"acceleration": {"x": 1.0, "y": 0.0, "z": 0.0}, "w": 1});
        assert!(schema.validate_record("imu", &extra).is_err());
    }

    #[test]
    fn test_integer_range_checked() {
        let schema = StructuralSchema::new(vec![Field::new("service", DataType::Uint8)]);
        assert!(schema.validate_record("gps", &json!({"service": 2})).is_ok());
        assert!(schema.validate_record("gps", &json!({"service": 256})).is_err());
        assert!(schema.validate_record("gps", &json!({"service": -1})).is_err());
    }

    #[test]
    fn test_definition_serde() {
        let def = OntologyDefinition {
            tag: "imu".into(),
            serialization_format: SerializationFormat::Ragged,
            fields: imu_schema(),
        };
        let text = serde_json::to_string(&def).unwrap();
        let back: OntologyDefinition = serde_json::from_str(&text).unwrap();
        assert_eq!(back, def);
        assert_eq!(back.fingerprint(), def.fingerprint());
    }

    #[test]
    fn test_leaf_paths() {
        let paths: Vec<String> = imu_schema().leaf_paths().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["acceleration.x", "acceleration.y", "acceleration.z", "frame_id"]);
    }

    #[test]
    fn test_markers_are_nominal() {
        struct A;
        struct B;
        assert_eq!(TypeMarker::of::<A>(), TypeMarker::of::<A>());
        assert_ne!(TypeMarker::of::<A>(), TypeMarker::of::<B>());
    }
}
