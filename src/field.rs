//! Field paths and predicate construction
//!
//! A [`FieldNode`] is a typed accessor over a structural schema. Each step
//! (`field`, `key`) is checked against the schema it navigates, and each leaf
//! exposes only the operators its type supports:
//!
//! ```text
//! imu.field("acceleration")?.field("x")?.geq(0.01)?
//! platform::topic().field("user_metadata")?.key("sensor_id")?.eq("imu_front_01")?
//! ```

use std::fmt;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::error::{OntologyError, Result};
use crate::schema::{DataType, StructuralSchema};
use crate::value::{MatchMode, Op, Value};

/// What a field path is rooted at
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathRoot {
    Sequence,
    Topic,
    Ontology(String),
}

impl PathRoot {
    pub fn kind(&self) -> &'static str {
        match self {
            PathRoot::Sequence => "sequence",
            PathRoot::Topic => "topic",
            PathRoot::Ontology(_) => "ontology",
        }
    }
}

/// One step of a field path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// A named struct field
    Field(String),
    /// Keyed access into a string-keyed map
    Key(String),
}

/// Ordered segments rooted at a schema
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    root: PathRoot,
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn root(&self) -> &PathRoot {
        &self.root
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Key relative to the root, e.g. `acceleration.x` or `user_metadata[status]`
    pub fn key(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Field(name) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(name);
                }
                Segment::Key(key) => {
                    out.push('[');
                    out.push_str(key);
                    out.push(']');
                }
            }
        }
        out
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            PathRoot::Ontology(tag) => write!(f, "{}.{}", tag, self.key()),
            other => write!(f, "{}.{}", other.kind(), self.key()),
        }
    }
}

/// A single constraint: a field path bound to an operator
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    path: FieldPath,
    op: Op,
}

impl Predicate {
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Key this predicate occupies in a query builder
    pub fn key(&self) -> String {
        self.path.key()
    }

    pub fn into_parts(self) -> (FieldPath, Op) {
        (self.path, self.op)
    }
}

/// Typed accessor for one node of a schema
#[derive(Debug, Clone)]
pub struct FieldNode {
    path: FieldPath,
    data_type: DataType,
}

impl FieldNode {
    /// Root accessor over a whole schema
    pub fn root(root: PathRoot, schema: &StructuralSchema) -> Self {
        Self {
            path: FieldPath {
                root,
                segments: Vec::new(),
            },
            data_type: DataType::Struct(schema.fields.clone()),
        }
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn field_path(&self) -> &FieldPath {
        &self.path
    }

    /// Step into a named struct field
    pub fn field(&self, name: &str) -> Result<FieldNode> {
        let fields = match &self.data_type {
            DataType::Struct(fields) => fields,
            _ => return Err(self.unknown_child(name, &[])),
        };
        match fields.iter().find(|f| f.name == name) {
            Some(field) => Ok(self.child(Segment::Field(name.to_string()), field.data_type.clone())),
            None => {
                let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                Err(self.unknown_child(name, &names))
            }
        }
    }

    /// Keyed access into a map node. Keys are not checked against a known set,
    /// but must not contain brackets so the rendered key stays unambiguous.
    pub fn key(&self, key: &str) -> Result<FieldNode> {
        match &self.data_type {
            DataType::Map(_) if key.contains(['[', ']']) => Err(OntologyError::invalid_operand(
                &format!("{}[{}]", self.path, key),
                "map key must not contain '[' or ']'",
            )),
            DataType::Map(values) => Ok(self.child(Segment::Key(key.to_string()), values.as_ref().clone())),
            _ => Err(OntologyError::UnknownFieldPath {
                path: format!("{}[{}]", self.path, key),
                suggestion: None,
            }),
        }
    }

    /// Follow a dotted path of struct fields, e.g. `header.stamp.sec`
    pub fn path(&self, dotted: &str) -> Result<FieldNode> {
        dotted
            .split('.')
            .try_fold(self.clone(), |node, name| node.field(name))
    }

    pub fn eq(&self, value: impl Into<Value>) -> Result<Predicate> {
        let value = value.into();
        self.check_equality(&value)?;
        Ok(self.predicate(Op::Eq(value)))
    }

    pub fn geq(&self, value: impl Into<Value>) -> Result<Predicate> {
        let value = value.into();
        self.check_ordering(&value)?;
        Ok(self.predicate(Op::Geq(value)))
    }

    pub fn gt(&self, value: impl Into<Value>) -> Result<Predicate> {
        let value = value.into();
        self.check_ordering(&value)?;
        Ok(self.predicate(Op::Gt(value)))
    }

    pub fn leq(&self, value: impl Into<Value>) -> Result<Predicate> {
        let value = value.into();
        self.check_ordering(&value)?;
        Ok(self.predicate(Op::Leq(value)))
    }

    pub fn lt(&self, value: impl Into<Value>) -> Result<Predicate> {
        let value = value.into();
        self.check_ordering(&value)?;
        Ok(self.predicate(Op::Lt(value)))
    }

    /// Inclusive range `[low, high]`
    pub fn between(&self, low: impl Into<Value>, high: impl Into<Value>) -> Result<Predicate> {
        let (low, high) = (low.into(), high.into());
        self.check_ordering(&low)?;
        self.check_ordering(&high)?;
        match low.partial_cmp(&high) {
            Some(std::cmp::Ordering::Greater) => Err(self.invalid("between: low bound exceeds high bound")),
            Some(_) => Ok(self.predicate(Op::Between(low, high))),
            None => Err(self.invalid("between: bounds are not comparable")),
        }
    }

    /// `between` from an operand list, which must hold exactly two elements
    pub fn between_slice(&self, bounds: &[Value]) -> Result<Predicate> {
        match bounds {
            [low, high] => self.between(low.clone(), high.clone()),
            _ => Err(self.invalid(format!(
                "between: expected 2 elements, got {}",
                bounds.len()
            ))),
        }
    }

    /// Set membership
    pub fn in_<I, V>(&self, values: I) -> Result<Predicate>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(self.invalid("in: empty value set"));
        }
        for value in &values {
            self.check_equality(value)?;
        }
        Ok(self.predicate(Op::In(values)))
    }

    /// Pattern match on a string field
    pub fn matches(&self, pattern: impl Into<String>, mode: MatchMode) -> Result<Predicate> {
        let pattern = pattern.into();
        match &self.data_type {
            t if t.is_string() => {}
            DataType::Variant => {}
            other => return Err(self.invalid(format!("match is not supported on {}", other))),
        }
        Ok(self.predicate(Op::Match(pattern, mode)))
    }

    fn child(&self, segment: Segment, data_type: DataType) -> FieldNode {
        let mut path = self.path.clone();
        path.segments.push(segment);
        FieldNode { path, data_type }
    }

    fn predicate(&self, op: Op) -> Predicate {
        Predicate {
            path: self.path.clone(),
            op,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> OntologyError {
        OntologyError::invalid_operand(&self.path.to_string(), reason)
    }

    fn unknown_child(&self, name: &str, candidates: &[&str]) -> OntologyError {
        let path = if self.path.segments.is_empty() {
            match &self.path.root {
                PathRoot::Ontology(tag) => format!("{}.{}", tag, name),
                other => format!("{}.{}", other.kind(), name),
            }
        } else {
            format!("{}.{}", self.path, name)
        };
        OntologyError::UnknownFieldPath {
            path,
            suggestion: closest(name, candidates),
        }
    }

    fn check_finite(&self, value: &Value) -> Result<()> {
        match value {
            Value::Float(f) if !f.is_finite() => Err(self.invalid(format!("{} is not a finite number", f))),
            _ => Ok(()),
        }
    }

    fn check_equality(&self, value: &Value) -> Result<()> {
        self.check_finite(value)?;
        let ok = match (&self.data_type, value) {
            (DataType::Variant, _) => true,
            (DataType::Boolean, Value::Boolean(_)) => true,
            (t, Value::Integer(_)) if t.is_numeric() => true,
            (t, Value::Float(_)) if t.is_float() => true,
            (t, Value::Text(_)) if t.is_string() => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(self.type_error(value))
        }
    }

    fn check_ordering(&self, value: &Value) -> Result<()> {
        self.check_finite(value)?;
        let ok = match (&self.data_type, value) {
            (DataType::Variant, v) => v.is_numeric(),
            (t, Value::Integer(_)) if t.is_numeric() => true,
            (t, Value::Float(_)) if t.is_float() => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(self.type_error(value))
        }
    }

    fn type_error(&self, value: &Value) -> OntologyError {
        self.invalid(format!(
            "{} operand is not supported on a {} field",
            value.kind(),
            self.data_type
        ))
    }
}

/// Best fuzzy match for a mistyped name
pub(crate) fn closest(name: &str, candidates: &[&str]) -> Option<String> {
    let matcher = SkimMatcherV2::default();
    candidates
        .iter()
        .filter_map(|c| {
            matcher
                .fuzzy_match(c, name)
                .or_else(|| matcher.fuzzy_match(name, c))
                .map(|score| (score, *c))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, c)| c.to_string())
}
