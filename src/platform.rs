//! Platform-level schemas for sequences and topics
//!
//! Sequences and topics are not ontologies, but their queryable attributes
//! are navigated the same way:
//!
//! ```text
//! platform::sequence().field("user_metadata")?.key("status")?.eq("raw")?
//! ```

use crate::field::{FieldNode, PathRoot};
use crate::schema::{DataType, Field, StructuralSchema};

/// Reserved key of the name filter
pub const NAME_KEY: &str = "name";
/// Reserved key of the creation-time filter
pub const CREATED_KEY: &str = "created_timestamp";
/// Map of caller-defined metadata
pub const METADATA_KEY: &str = "user_metadata";

fn platform_schema() -> StructuralSchema {
    StructuralSchema::new(vec![
        Field::new(NAME_KEY, DataType::String),
        Field::new(CREATED_KEY, DataType::Timestamp),
        Field::new(METADATA_KEY, DataType::map(DataType::Variant)),
    ])
}

/// Root accessor for sequence attributes
pub fn sequence() -> FieldNode {
    FieldNode::root(PathRoot::Sequence, &platform_schema())
}

/// Root accessor for topic attributes
pub fn topic() -> FieldNode {
    FieldNode::root(PathRoot::Topic, &platform_schema())
}

/// Shortcut for `sequence().field("user_metadata")?.key(key)`
pub fn sequence_metadata(key: &str) -> FieldNode {
    metadata(sequence(), key)
}

/// Shortcut for `topic().field("user_metadata")?.key(key)`
pub fn topic_metadata(key: &str) -> FieldNode {
    metadata(topic(), key)
}

fn metadata(root: FieldNode, key: &str) -> FieldNode {
    // user_metadata is always a map in the platform schema
    root.field(METADATA_KEY)
        .and_then(|node| node.key(key))
        .unwrap_or(root)
}
