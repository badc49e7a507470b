//! Transport capability consumed by the core
//!
//! The transport owns framing, blocking, timeouts and retries. From the
//! core's point of view both calls are synchronous and single-attempt.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{OntologyError, Result};
use crate::query::CanonicalQueryDocument;
use crate::writer::ColumnarBatch;

/// Errors reported by a transport implementation, passed through unmodified
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("{0}")]
    Other(String),
}

/// Acknowledgement of an accepted batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ack {
    pub rows: usize,
}

/// One row of an executor response: a sequence and its fully-qualified topics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub sequence: String,
    pub topics: Vec<String>,
}

/// Destination of a batch: a topic within a sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicTarget {
    sequence: String,
    topic: String,
}

impl TopicTarget {
    /// Build a target from a sequence name and a topic path.
    ///
    /// The topic is normalized to its leading-slash form (`/a/b`). Sequence
    /// names cannot contain `/`.
    pub fn new(sequence: &str, topic: &str) -> Result<Self> {
        let topic_path = topic.trim_start_matches('/');
        if sequence.is_empty() || sequence.contains('/') || topic_path.is_empty() {
            return Err(OntologyError::MalformedTopicPath {
                topic: format!("{}/{}", sequence, topic_path),
            });
        }
        Ok(Self {
            sequence: sequence.to_string(),
            topic: format!("/{}", topic_path),
        })
    }

    /// Parse a fully-qualified `sequence/topic/path` resource name
    pub fn parse(resource: &str) -> Result<Self> {
        match resource.split_once('/') {
            Some((sequence, topic)) => Self::new(sequence, topic).map_err(|_| {
                OntologyError::MalformedTopicPath {
                    topic: resource.to_string(),
                }
            }),
            None => Err(OntologyError::MalformedTopicPath {
                topic: resource.to_string(),
            }),
        }
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// Topic-local path, e.g. `/camera/left`
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Fully-qualified name, e.g. `run_1/camera/left`
    pub fn resource_name(&self) -> String {
        format!("{}{}", self.sequence, self.topic)
    }
}

impl fmt::Display for TopicTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.sequence, self.topic)
    }
}

/// Capability to move batches and queries to the platform
pub trait Transport {
    /// Send one columnar batch to a topic
    fn send_batch(
        &self,
        target: &TopicTarget,
        batch: &ColumnarBatch,
    ) -> std::result::Result<Ack, TransportError>;

    /// Submit a compiled query document and return the matching rows
    fn submit_query(
        &self,
        document: &CanonicalQueryDocument,
    ) -> std::result::Result<Vec<RawRow>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send_batch(
        &self,
        target: &TopicTarget,
        batch: &ColumnarBatch,
    ) -> std::result::Result<Ack, TransportError> {
        (**self).send_batch(target, batch)
    }

    fn submit_query(
        &self,
        document: &CanonicalQueryDocument,
    ) -> std::result::Result<Vec<RawRow>, TransportError> {
        (**self).submit_query(document)
    }
}
