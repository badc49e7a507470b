//! Literal values and predicate operators

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

/// A literal operand. Heterogeneous so metadata predicates can mix types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Boolean(b) => json!(b),
            Value::Integer(n) => json!(n),
            Value::Float(f) => json!(f),
            Value::Text(s) => json!(s),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(n as f64)
    }
}

macro_rules! integer_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Integer(n as i64)
            }
        })*
    };
}

integer_value!(i8, i16, i32, i64, u8, u16, u32);

/// Timestamps are compared as nanoseconds since the Unix epoch
impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Integer(timestamp_ns(&t))
    }
}

/// Nanoseconds since the Unix epoch, saturating outside the representable range
pub fn timestamp_ns(t: &DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt().unwrap_or(if t.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

/// How a name pattern is matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    #[default]
    Contains,
    StartsWith,
    EndsWith,
}

/// Logical operator applied to a field
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Eq(Value),
    Geq(Value),
    Gt(Value),
    Leq(Value),
    Lt(Value),
    /// Inclusive range `[low, high]`
    Between(Value, Value),
    In(Vec<Value>),
    Match(String, MatchMode),
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Eq(_) => "$eq",
            Op::Geq(_) => "$geq",
            Op::Gt(_) => "$gt",
            Op::Leq(_) => "$leq",
            Op::Lt(_) => "$lt",
            Op::Between(..) => "$between",
            Op::In(_) => "$in",
            Op::Match(_, MatchMode::Exact) => "$eq",
            Op::Match(..) => "$match",
        }
    }

    /// Render as a single-operator document node, e.g. `{"$geq": 0.01}`
    pub fn to_json(&self) -> Json {
        let operand = match self {
            Op::Eq(v) | Op::Geq(v) | Op::Gt(v) | Op::Leq(v) | Op::Lt(v) => v.to_json(),
            Op::Between(lo, hi) => json!([lo.to_json(), hi.to_json()]),
            Op::In(values) => Json::Array(values.iter().map(Value::to_json).collect()),
            Op::Match(pattern, MatchMode::Exact) => json!(pattern),
            Op::Match(pattern, mode) => json!(like_pattern(pattern, *mode)),
        };
        let mut node = serde_json::Map::new();
        node.insert(self.name().to_string(), operand);
        Json::Object(node)
    }
}

/// Translate a match into a LIKE pattern, escaping wildcards in the input
fn like_pattern(pattern: &str, mode: MatchMode) -> String {
    let mut escaped = String::with_capacity(pattern.len() + 2);
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    match mode {
        MatchMode::Exact => escaped,
        MatchMode::Contains => format!("%{}%", escaped),
        MatchMode::StartsWith => format!("{}%", escaped),
        MatchMode::EndsWith => format!("%{}", escaped),
    }
}
