//! Query responses
//!
//! The executor reports topics by their fully-qualified resource name
//! (`sequence/the/topic`); responses keep the topic-local part (`/the/topic`).

use std::ops::Index;
use std::slice;

use serde::Serialize;

use super::builder::{QuerySequence, QueryTopic};
use crate::error::Result;
use crate::transport::{RawRow, TopicTarget};

/// A matching sequence and the topics within it that matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResponseItem {
    pub sequence: String,
    pub topics: Vec<String>,
}

impl QueryResponseItem {
    /// Normalize a raw row; any malformed topic name fails the whole row
    pub fn from_row(row: RawRow) -> Result<Self> {
        let topics = row
            .topics
            .iter()
            .map(|full| TopicTarget::parse(full).map(|target| target.topic().to_string()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            sequence: row.sequence,
            topics,
        })
    }
}

/// Ordered list of response items
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryResponse {
    items: Vec<QueryResponseItem>,
}

impl QueryResponse {
    pub fn new(items: Vec<QueryResponseItem>) -> Self {
        Self { items }
    }

    /// Normalize executor rows, preserving their order
    pub fn from_rows(rows: Vec<RawRow>) -> Result<Self> {
        let items = rows
            .into_iter()
            .map(QueryResponseItem::from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }

    /// Sequence query restricted to the sequences in this response
    pub fn to_query_sequence(&self) -> QuerySequence {
        QuerySequence::name_in(self.items.iter().map(|it| it.sequence.clone()).collect())
    }

    /// Topic query restricted to every topic in this response
    pub fn to_query_topic(&self) -> QueryTopic {
        QueryTopic::name_in(
            self.items
                .iter()
                .flat_map(|it| it.topics.iter().cloned())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QueryResponseItem> {
        self.items.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, QueryResponseItem> {
        self.items.iter()
    }

    pub fn items(&self) -> &[QueryResponseItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<QueryResponseItem> {
        self.items
    }
}

impl Index<usize> for QueryResponse {
    type Output = QueryResponseItem;

    fn index(&self, index: usize) -> &Self::Output {
        &self.items[index]
    }
}

impl<'a> IntoIterator for &'a QueryResponse {
    type Item = &'a QueryResponseItem;
    type IntoIter = slice::Iter<'a, QueryResponseItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl IntoIterator for QueryResponse {
    type Item = QueryResponseItem;
    type IntoIter = std::vec::IntoIter<QueryResponseItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OntologyError;
    use serde_json::json;

    fn row(sequence: &str, topics: &[&str]) -> RawRow {
        RawRow {
            sequence: sequence.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_topics_are_normalized() {
        let response =
            QueryResponse::from_rows(vec![row("seq", &["seq/the/topic", "seq/imu"])]).unwrap();
        assert_eq!(response[0].topics, vec!["/the/topic", "/imu"]);
    }

    #[test]
    fn test_malformed_topic() {
        let err = QueryResponse::from_rows(vec![row("seq", &["no_separator"])]).unwrap_err();
        match err {
            OntologyError::MalformedTopicPath { topic } => assert_eq!(topic, "no_separator"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_container_behaviour() {
        let response = QueryResponse::from_rows(vec![
            row("a", &["a/x"]),
            row("b", &["b/y", "b/z"]),
        ])
        .unwrap();
        assert_eq!(response.len(), 2);
        assert!(!response.is_empty());
        assert_eq!(response.get(1).map(|it| it.sequence.as_str()), Some("b"));
        assert!(response.get(2).is_none());
        let names: Vec<&str> = (&response).into_iter().map(|it| it.sequence.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(QueryResponse::default().is_empty());
    }

    #[test]
    fn test_requery_builders() {
        let response = QueryResponse::from_rows(vec![
            row("a", &["a/x"]),
            row("b", &["b/y", "b/z"]),
        ])
        .unwrap();

        assert_eq!(
            response.to_query_sequence().to_json(),
            json!({"name": {"$in": ["a", "b"]}})
        );
        assert_eq!(
            response.to_query_topic().to_json(),
            json!({"name": {"$in": ["/x", "/y", "/z"]}})
        );
        // the derived builders still enforce key uniqueness
        assert!(response.to_query_sequence().with_name("a").is_err());
    }
}
