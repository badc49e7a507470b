//! Query builders
//!
//! Each builder constrains one kind of entity. Builders are plain values:
//! every `with_*` consumes the builder and hands it back, or fails without
//! side effects. A field-path key may appear at most once per builder.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as Json};

use crate::error::{OntologyError, Result};
use crate::field::{PathRoot, Predicate};
use crate::ontology::Ontology;
use crate::platform::{CREATED_KEY, NAME_KEY};
use crate::value::{timestamp_ns, MatchMode, Op, Value};

/// Reserved key holding a topic's ontology tag
pub const ONTOLOGY_TAG_KEY: &str = "ontology_tag";

/// Ordered, duplicate-free set of `key -> operator` filters
#[derive(Debug, Clone, Default, PartialEq)]
struct Filters {
    entries: BTreeMap<String, Op>,
}

impl Filters {
    fn insert(&mut self, key: String, op: Op) -> Result<()> {
        if self.entries.contains_key(&key) {
            return Err(OntologyError::duplicate_key(key));
        }
        self.entries.insert(key, op);
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_json(&self) -> Json {
        let map: Map<String, Json> = self
            .entries
            .iter()
            .map(|(key, op)| (key.clone(), op.to_json()))
            .collect();
        Json::Object(map)
    }
}

fn name_match(pattern: String, mode: MatchMode) -> Op {
    match mode {
        MatchMode::Exact => Op::Eq(Value::Text(pattern)),
        mode => Op::Match(pattern, mode),
    }
}

fn time_range(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Op> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => Err(OntologyError::invalid_operand(
            CREATED_KEY,
            "start timestamp is after end timestamp",
        )),
        (Some(start), Some(end)) => Ok(Op::Between(
            Value::Integer(timestamp_ns(&start)),
            Value::Integer(timestamp_ns(&end)),
        )),
        (Some(start), None) => Ok(Op::Geq(Value::Integer(timestamp_ns(&start)))),
        (None, Some(end)) => Ok(Op::Leq(Value::Integer(timestamp_ns(&end)))),
        (None, None) => Err(OntologyError::invalid_operand(
            CREATED_KEY,
            "at least one of start or end must be given",
        )),
    }
}

fn check_root(predicate: &Predicate, expected: &'static str) -> Result<()> {
    if predicate.path().root().kind() == expected {
        Ok(())
    } else {
        Err(OntologyError::ExpressionKindMismatch {
            path: predicate.path().to_string(),
            expected,
        })
    }
}

/// Filters over sequence attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySequence {
    filters: Filters,
}

impl QuerySequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence name equals `name`
    pub fn with_name(self, name: impl Into<String>) -> Result<Self> {
        self.with_name_match(name, MatchMode::Exact)
    }

    /// Sequence name matches `pattern` according to `mode`
    pub fn with_name_match(mut self, pattern: impl Into<String>, mode: MatchMode) -> Result<Self> {
        self.filters
            .insert(NAME_KEY.to_string(), name_match(pattern.into(), mode))?;
        Ok(self)
    }

    /// Sequence created within the given bounds (inclusive)
    pub fn with_created_timestamp(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        if self.filters.contains(CREATED_KEY) {
            return Err(OntologyError::duplicate_key(CREATED_KEY));
        }
        self.filters.insert(CREATED_KEY.to_string(), time_range(start, end)?)?;
        Ok(self)
    }

    /// Add a predicate rooted at [`crate::platform::sequence`]
    pub fn with_expression(mut self, predicate: Predicate) -> Result<Self> {
        check_root(&predicate, "sequence")?;
        let key = predicate.key();
        let (_, op) = predicate.into_parts();
        self.filters.insert(key, op)?;
        Ok(self)
    }

    /// Name in a fixed set. An empty set matches nothing.
    pub(crate) fn name_in(names: Vec<String>) -> Self {
        let mut filters = Filters::default();
        filters.entries.insert(
            NAME_KEY.to_string(),
            Op::In(names.into_iter().map(Value::Text).collect()),
        );
        Self { filters }
    }

    /// Keys in use, sorted
    pub fn keys(&self) -> Vec<String> {
        self.filters.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub(crate) fn to_json(&self) -> Json {
        self.filters.to_json()
    }
}

/// Filters over topic attributes and the topic's ontology tag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryTopic {
    filters: Filters,
}

impl QueryTopic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Topic name equals `name`, e.g. `/camera/left`
    pub fn with_name(self, name: impl Into<String>) -> Result<Self> {
        self.with_name_match(name, MatchMode::Exact)
    }

    pub fn with_name_match(mut self, pattern: impl Into<String>, mode: MatchMode) -> Result<Self> {
        self.filters
            .insert(NAME_KEY.to_string(), name_match(pattern.into(), mode))?;
        Ok(self)
    }

    pub fn with_created_timestamp(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        if self.filters.contains(CREATED_KEY) {
            return Err(OntologyError::duplicate_key(CREATED_KEY));
        }
        self.filters.insert(CREATED_KEY.to_string(), time_range(start, end)?)?;
        Ok(self)
    }

    /// Restrict to topics carrying `tag`
    pub fn with_ontology_tag(mut self, tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(OntologyError::invalid_operand(
                ONTOLOGY_TAG_KEY,
                "empty ontology tag",
            ));
        }
        self.filters
            .insert(ONTOLOGY_TAG_KEY.to_string(), Op::Eq(Value::Text(tag)))?;
        Ok(self)
    }

    /// Restrict to topics of the native ontology `T`
    pub fn with_ontology<T: Ontology>(self) -> Result<Self> {
        self.with_ontology_tag(T::TAG)
    }

    /// Add a predicate rooted at [`crate::platform::topic`]
    pub fn with_expression(mut self, predicate: Predicate) -> Result<Self> {
        check_root(&predicate, "topic")?;
        let key = predicate.key();
        let (_, op) = predicate.into_parts();
        self.filters.insert(key, op)?;
        Ok(self)
    }

    pub(crate) fn name_in(names: Vec<String>) -> Self {
        let mut filters = Filters::default();
        filters.entries.insert(
            NAME_KEY.to_string(),
            Op::In(names.into_iter().map(Value::Text).collect()),
        );
        Self { filters }
    }

    pub fn keys(&self) -> Vec<String> {
        self.filters.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub(crate) fn to_json(&self) -> Json {
        self.filters.to_json()
    }
}

/// Filters over the data of registered ontologies
///
/// Predicates are grouped by the ontology tag they are rooted at. A tag named
/// with [`QueryOntologyCatalog::with_ontology_tag`] and no predicates narrows
/// the search to that ontology without constraining its values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOntologyCatalog {
    by_tag: BTreeMap<String, Filters>,
    narrowed: BTreeSet<String>,
}

impl QueryOntologyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate rooted at an ontology tag (see [`crate::OntologyRegistry::q`])
    pub fn with_expression(mut self, predicate: Predicate) -> Result<Self> {
        let tag = match predicate.path().root() {
            PathRoot::Ontology(tag) => tag.clone(),
            _ => {
                return Err(OntologyError::ExpressionKindMismatch {
                    path: predicate.path().to_string(),
                    expected: "ontology",
                })
            }
        };
        let full_key = predicate.path().to_string();
        let key = predicate.key();
        let filters = self.by_tag.entry(tag).or_default();
        if filters.contains(&key) {
            return Err(OntologyError::duplicate_key(full_key));
        }
        let (_, op) = predicate.into_parts();
        filters.insert(key, op)?;
        Ok(self)
    }

    /// Narrow the search to ontology `tag`
    pub fn with_ontology_tag(mut self, tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(OntologyError::invalid_operand(
                ONTOLOGY_TAG_KEY,
                "empty ontology tag",
            ));
        }
        if !self.narrowed.insert(tag.clone()) {
            return Err(OntologyError::duplicate_key(tag));
        }
        self.by_tag.entry(tag).or_default();
        Ok(self)
    }

    pub fn with_ontology<T: Ontology>(self) -> Result<Self> {
        self.with_ontology_tag(T::TAG)
    }

    /// Tags referenced by this builder, sorted
    pub fn tags(&self) -> Vec<String> {
        self.by_tag.keys().cloned().collect()
    }

    /// Fully-qualified keys in use, e.g. `imu.acceleration.x`
    pub fn keys(&self) -> Vec<String> {
        self.by_tag
            .iter()
            .flat_map(|(tag, filters)| {
                filters
                    .entries
                    .keys()
                    .map(move |key| format!("{}.{}", tag, key))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    pub(crate) fn to_json(&self) -> Json {
        let map: Map<String, Json> = self
            .by_tag
            .iter()
            .map(|(tag, filters)| (tag.clone(), filters.to_json()))
            .collect();
        Json::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::Imu;
    use crate::platform;
    use crate::registry::OntologyRegistry;
    use chrono::TimeZone;
    use serde_json::json;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_duplicate_name_key() {
        let err = QuerySequence::new()
            .with_name("run_1")
            .unwrap()
            .with_name_match("run", MatchMode::StartsWith)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query builder already contains the key 'name'"
        );
    }

    #[test]
    fn test_name_expression_shares_reserved_key() {
        let name = platform::sequence().field(NAME_KEY).unwrap();
        let result = QuerySequence::new()
            .with_name("run_1")
            .unwrap()
            .with_expression(name.eq("run_2").unwrap());
        assert!(matches!(result, Err(OntologyError::DuplicateKey { .. })));
    }

    #[test]
    fn test_created_timestamp_bounds() {
        let both = QuerySequence::new()
            .with_created_timestamp(Some(t(1)), Some(t(2)))
            .unwrap();
        assert_eq!(
            both.to_json(),
            json!({"created_timestamp": {"$between": [1_000_000_000i64, 2_000_000_000i64]}})
        );

        let start = QueryTopic::new().with_created_timestamp(Some(t(1)), None).unwrap();
        assert_eq!(
            start.to_json(),
            json!({"created_timestamp": {"$geq": 1_000_000_000i64}})
        );

        let end = QueryTopic::new().with_created_timestamp(None, Some(t(2))).unwrap();
        assert_eq!(
            end.to_json(),
            json!({"created_timestamp": {"$leq": 2_000_000_000i64}})
        );
    }

    #[test]
    fn test_created_timestamp_errors() {
        assert!(matches!(
            QuerySequence::new().with_created_timestamp(None, None),
            Err(OntologyError::InvalidOperand { .. })
        ));
        assert!(matches!(
            QuerySequence::new().with_created_timestamp(Some(t(2)), Some(t(1))),
            Err(OntologyError::InvalidOperand { .. })
        ));
        let err = QuerySequence::new()
            .with_created_timestamp(Some(t(1)), None)
            .unwrap()
            .with_created_timestamp(None, Some(t(2)))
            .unwrap_err();
        assert!(matches!(err, OntologyError::DuplicateKey { key } if key == CREATED_KEY));
    }

    #[test]
    fn test_expression_kind_mismatch() {
        let topic_pred = platform::topic_metadata("sensor_id").eq("imu_front").unwrap();
        assert!(matches!(
            QuerySequence::new().with_expression(topic_pred.clone()),
            Err(OntologyError::ExpressionKindMismatch { expected: "sequence", .. })
        ));
        assert!(matches!(
            QueryOntologyCatalog::new().with_expression(topic_pred),
            Err(OntologyError::ExpressionKindMismatch { expected: "ontology", .. })
        ));
    }

    #[test]
    fn test_topic_ontology_tag() {
        let query = QueryTopic::new().with_ontology::<Imu>().unwrap();
        assert_eq!(query.to_json(), json!({"ontology_tag": {"$eq": "imu"}}));
        let err = query.with_ontology_tag("gps").unwrap_err();
        assert!(matches!(err, OntologyError::DuplicateKey { key } if key == ONTOLOGY_TAG_KEY));
    }

    #[test]
    fn test_catalog_groups_by_tag() {
        let registry = OntologyRegistry::with_builtins().unwrap();
        let imu = registry.q("imu").unwrap();
        let query = QueryOntologyCatalog::new()
            .with_expression(imu.path("acceleration.x").unwrap().geq(0.01).unwrap())
            .unwrap()
            .with_ontology_tag("gps")
            .unwrap();

        assert_eq!(query.tags(), vec!["gps", "imu"]);
        assert_eq!(query.keys(), vec!["imu.acceleration.x"]);
        assert_eq!(
            query.to_json(),
            json!({
                "gps": {},
                "imu": {"acceleration.x": {"$geq": 0.01}}
            })
        );
    }

    #[test]
    fn test_catalog_duplicates() {
        let registry = OntologyRegistry::with_builtins().unwrap();
        let x = registry.q("imu").unwrap().path("acceleration.x").unwrap();
        let err = QueryOntologyCatalog::new()
            .with_expression(x.geq(0.0).unwrap())
            .unwrap()
            .with_expression(x.lt(1.0).unwrap())
            .unwrap_err();
        assert!(matches!(err, OntologyError::DuplicateKey { key } if key == "imu.acceleration.x"));

        let err = QueryOntologyCatalog::new()
            .with_ontology_tag("imu")
            .unwrap()
            .with_ontology_tag("imu")
            .unwrap_err();
        assert!(matches!(err, OntologyError::DuplicateKey { .. }));
    }

    #[test]
    fn test_failed_with_leaves_no_trace() {
        let base = QueryTopic::new().with_name("/imu").unwrap();
        let snapshot = base.clone();
        assert!(base.clone().with_name("/gps").is_err());
        assert_eq!(base, snapshot);
        assert_eq!(base.keys(), vec!["name"]);
    }
}
