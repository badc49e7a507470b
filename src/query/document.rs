//! Query composition and the canonical document
//!
//! A [`Query`] holds at most one builder of each kind; the kinds are combined
//! with AND. Compilation is pure: the same query always produces the same
//! document, with sections and keys in sorted order.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value as Json};

use super::builder::{QueryOntologyCatalog, QuerySequence, QueryTopic};
use crate::error::{OntologyError, Result};

/// Any of the three builder kinds
#[derive(Debug, Clone, PartialEq)]
pub enum QueryBuilder {
    Sequence(QuerySequence),
    Topic(QueryTopic),
    Ontology(QueryOntologyCatalog),
}

impl QueryBuilder {
    /// Section name in the compiled document
    pub fn kind(&self) -> &'static str {
        match self {
            QueryBuilder::Sequence(_) => "sequence",
            QueryBuilder::Topic(_) => "topic",
            QueryBuilder::Ontology(_) => "ontology",
        }
    }
}

impl From<QuerySequence> for QueryBuilder {
    fn from(q: QuerySequence) -> Self {
        QueryBuilder::Sequence(q)
    }
}

impl From<QueryTopic> for QueryBuilder {
    fn from(q: QueryTopic) -> Self {
        QueryBuilder::Topic(q)
    }
}

impl From<QueryOntologyCatalog> for QueryBuilder {
    fn from(q: QueryOntologyCatalog) -> Self {
        QueryBuilder::Ontology(q)
    }
}

/// A conjunction of builders, one per kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    sequence: Option<QuerySequence>,
    topic: Option<QueryTopic>,
    ontology: Option<QueryOntologyCatalog>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a builder. Two builders of the same kind are rejected.
    pub fn with(mut self, builder: impl Into<QueryBuilder>) -> Result<Self> {
        let builder = builder.into();
        let kind = builder.kind();
        let taken = match &builder {
            QueryBuilder::Sequence(_) => self.sequence.is_some(),
            QueryBuilder::Topic(_) => self.topic.is_some(),
            QueryBuilder::Ontology(_) => self.ontology.is_some(),
        };
        if taken {
            return Err(OntologyError::DuplicateQueryKind { kind });
        }
        match builder {
            QueryBuilder::Sequence(q) => self.sequence = Some(q),
            QueryBuilder::Topic(q) => self.topic = Some(q),
            QueryBuilder::Ontology(q) => self.ontology = Some(q),
        }
        Ok(self)
    }

    /// Build a query from a list of builders
    pub fn from_builders<I>(builders: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<QueryBuilder>,
    {
        builders
            .into_iter()
            .try_fold(Self::new(), |query, builder| query.with(builder))
    }

    pub fn sequence(&self) -> Option<&QuerySequence> {
        self.sequence.as_ref()
    }

    pub fn topic(&self) -> Option<&QueryTopic> {
        self.topic.as_ref()
    }

    pub fn ontology(&self) -> Option<&QueryOntologyCatalog> {
        self.ontology.as_ref()
    }

    /// True when no builder has been supplied
    pub fn is_empty(&self) -> bool {
        self.sequence.is_none() && self.topic.is_none() && self.ontology.is_none()
    }

    /// Compile into the document sent to the executor
    pub fn compile(&self) -> CanonicalQueryDocument {
        let mut root = Map::new();
        if let Some(q) = &self.sequence {
            root.insert("sequence".to_string(), q.to_json());
        }
        if let Some(q) = &self.topic {
            root.insert("topic".to_string(), q.to_json());
        }
        if let Some(q) = &self.ontology {
            root.insert("ontology".to_string(), q.to_json());
        }
        CanonicalQueryDocument(Json::Object(root))
    }
}

impl From<QuerySequence> for Query {
    fn from(q: QuerySequence) -> Self {
        Self {
            sequence: Some(q),
            ..Self::default()
        }
    }
}

impl From<QueryTopic> for Query {
    fn from(q: QueryTopic) -> Self {
        Self {
            topic: Some(q),
            ..Self::default()
        }
    }
}

impl From<QueryOntologyCatalog> for Query {
    fn from(q: QueryOntologyCatalog) -> Self {
        Self {
            ontology: Some(q),
            ..Self::default()
        }
    }
}

/// Compiled query, ready for a transport
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CanonicalQueryDocument(Json);

impl CanonicalQueryDocument {
    pub fn as_json(&self) -> &Json {
        &self.0
    }

    pub fn into_json(self) -> Json {
        self.0
    }

    /// Section for one builder kind, if present
    pub fn section(&self, kind: &str) -> Option<&Map<String, Json>> {
        self.0.get(kind).and_then(Json::as_object)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl fmt::Display for CanonicalQueryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
