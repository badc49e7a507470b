//! Error types for the ontology client

use thiserror::Error;

use crate::transport::TransportError;

/// Result type for ontology client operations
pub type Result<T> = std::result::Result<T, OntologyError>;

/// Ontology client errors
#[derive(Error, Debug)]
pub enum OntologyError {
    // --- registration ---
    #[error("Ontology tag already registered: {tag}")]
    DuplicateTag { tag: String },

    #[error("Invalid schema for '{tag}': {reason}")]
    InvalidSchema { tag: String, reason: String },

    #[error("Unknown ontology tag: {tag}")]
    UnknownTag { tag: String },

    // --- query building ---
    #[error("Query builder already contains the key '{key}'")]
    DuplicateKey { key: String },

    #[error("Invalid operand for '{path}': {reason}")]
    InvalidOperand { path: String, reason: String },

    #[error("Unknown field path '{path}'{hint}", hint = suggestion_hint(.suggestion))]
    UnknownFieldPath {
        path: String,
        suggestion: Option<String>,
    },

    #[error("Expression on '{path}' cannot be used in a {expected} query")]
    ExpressionKindMismatch { path: String, expected: &'static str },

    #[error("Query already contains a {kind} builder")]
    DuplicateQueryKind { kind: &'static str },

    // --- responses ---
    #[error("Invalid topic name in response: {topic}")]
    MalformedTopicPath { topic: String },

    // --- writing ---
    #[error("Ontology type '{tag}' is not registered")]
    UnregisteredType { tag: String },

    #[error("Type '{type_name}' is not serializable as '{tag}': registration marker mismatch")]
    NotSerializable { tag: String, type_name: String },

    #[error("Record does not match schema '{tag}' at '{path}': {reason}")]
    SchemaMismatch {
        tag: String,
        path: String,
        reason: String,
    },

    #[error("Writer for topic '{topic}' is already closed")]
    WriterClosed { topic: String },

    #[error("Batch limit too small: threshold {threshold} + schema overhead {overhead} exceeds ceiling {ceiling} bytes")]
    BatchLimit {
        threshold: usize,
        overhead: usize,
        ceiling: usize,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- ambient ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{}'?)", s),
        None => String::new(),
    }
}

impl OntologyError {
    pub(crate) fn invalid_schema(tag: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            tag: tag.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_operand(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidOperand {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }
}
