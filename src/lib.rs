//! Ontology Client
//!
//! Client-side core for a sensor data platform that stores recordings as
//! sequences of topics, each topic carrying timestamped records of one
//! registered ontology type.
//!
//! ## Features
//!
//! - **Ontology Registry**: tag to structural schema, append-only, nominal write capability
//! - **Field Paths**: typed accessors that only expose operators the leaf type supports
//! - **Query Builders**: sequence, topic and ontology filters compiled to one canonical document
//! - **Streaming Writer**: size-bounded columnar batches, order-preserving, no internal retries
//!
//! ## Example
//!
//! ```text
//! let registry = OntologyRegistry::with_builtins()?;
//! let imu = registry.q("imu")?;
//!
//! let query = Query::new()
//!     .with(QueryOntologyCatalog::new().with_expression(imu.path("acceleration.x")?.geq(0.01)?)?)?
//!     .with(QuerySequence::new().with_name_match("run", MatchMode::StartsWith)?)?;
//! let response = ontology_client::query(&transport, &query)?;
//!
//! let mut writer = TopicWriter::open_typed::<Imu>(&registry, &transport, target, config)?;
//! writer.push_record(ts, &sample)?;
//! writer.close()?;
//! ```

pub mod checksum;
pub mod config;
pub mod definitions;
pub mod error;
pub mod field;
pub mod ontology;
pub mod platform;
pub mod query;
pub mod registry;
pub mod schema;
pub mod transport;
pub mod value;
pub mod writer;

pub use checksum::Checksum;
pub use config::ClientConfig;
pub use error::{OntologyError, Result};
pub use field::{FieldNode, FieldPath, PathRoot, Predicate};
pub use ontology::Ontology;
pub use query::{
    query, CanonicalQueryDocument, Query, QueryBuilder, QueryOntologyCatalog, QueryResponse,
    QueryResponseItem, QuerySequence, QueryTopic,
};
pub use registry::OntologyRegistry;
pub use schema::{
    DataType, Field, OntologyDefinition, SchemaEntry, SerializationFormat, StructuralSchema,
    TypeMarker,
};
pub use transport::{Ack, RawRow, TopicTarget, Transport, TransportError};
pub use value::{MatchMode, Op, Value};
pub use writer::{
    ColumnarBatch, ColumnarEstimator, Message, SizeEstimator, TopicWriter, WriterConfig,
    WriterStats,
};
