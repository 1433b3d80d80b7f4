//! Condition model: typed values, single comparisons and AND/OR trees.

use sea_orm::Value;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::{QueryError, QueryResult};

/// A single comparable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Lower-case text values, leaving other kinds untouched
    #[must_use]
    pub fn to_lowercase(&self) -> Self {
        match self {
            Self::Text(s) => Self::Text(s.to_lowercase()),
            other => other.clone(),
        }
    }

    /// Text form used inside LIKE patterns
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    fn from_json(value: &serde_json::Value, field: &str) -> QueryResult<Option<Self>> {
        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Bool(b) => Ok(Some(Self::Bool(*b))),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .map(Some)
                .ok_or_else(|| QueryError::validation(field, format!("unsupported number {n}"))),
            serde_json::Value::String(s) => Ok(Some(Self::Text(s.clone()))),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(
                QueryError::validation(field, "nested arrays and objects are not valid values"),
            ),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => json!(b),
            Self::Int(i) => json!(i),
            Self::Float(f) => json!(f),
            Self::Text(s) => json!(s),
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool(b) => b.into(),
            Scalar::Int(i) => i.into(),
            Scalar::Float(f) => f.into(),
            Scalar::Text(s) => s.into(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Value side of a condition; arity depends on the operator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    #[default]
    Null,
    List(Vec<Scalar>),
    Scalar(Scalar),
}

impl FilterValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Build a value from a JSON search payload.
    ///
    /// # Errors
    ///
    /// Fails for objects and for arrays containing arrays, objects or nulls.
    pub fn from_json(value: &serde_json::Value, field: &str) -> QueryResult<Self> {
        match value {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    Scalar::from_json(item, field)?.ok_or_else(|| {
                        QueryError::validation(field, "null is not allowed inside a list")
                    })
                })
                .collect::<QueryResult<Vec<_>>>()
                .map(Self::List),
            other => Ok(Scalar::from_json(other, field)?.map_or(Self::Null, Self::Scalar)),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Scalar(s) => s.to_json(),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Scalar::to_json).collect()),
        }
    }
}

impl FilterValue {
    /// Build a list value from anything convertible to scalars
    pub fn list<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

macro_rules! filter_value_from_scalar {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(value: $ty) -> Self {
                    Self::Scalar(value.into())
                }
            }
        )+
    };
}

filter_value_from_scalar!(Scalar, &str, String, i64, i32, f64, bool);

impl From<Vec<Scalar>> for FilterValue {
    fn from(values: Vec<Scalar>) -> Self {
        Self::List(values)
    }
}

/// Parse a raw query-string value the way the request grammar types it:
/// booleans, integers and floats that round-trip textually, `null`, and JSON
/// strings (quotes removed). Anything else is kept as text.
#[must_use]
pub fn parse_scalar(raw: &str) -> Option<Scalar> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Null) => None,
        Ok(serde_json::Value::Bool(b)) => Some(Scalar::Bool(b)),
        Ok(serde_json::Value::Number(n)) if n.to_string() == raw => {
            if let Some(i) = n.as_i64() {
                Some(Scalar::Int(i))
            } else if n.is_f64() {
                n.as_f64().map(Scalar::Float)
            } else {
                // u64 beyond i64: keep the digits rather than lose precision
                Some(Scalar::Text(raw.to_string()))
            }
        }
        Ok(serde_json::Value::String(s)) => Some(Scalar::Text(s)),
        _ => Some(Scalar::Text(raw.to_string())),
    }
}

/// Inverse of [`parse_scalar`]: text that would be re-typed, or that contains
/// `list_delim` when written as a list item, is written as a JSON string.
#[must_use]
pub fn format_scalar(scalar: &Scalar, list_delim: Option<char>) -> String {
    match scalar {
        Scalar::Bool(b) => b.to_string(),
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => serde_json::to_string(f).unwrap_or_else(|_| f.to_string()),
        Scalar::Text(s) => {
            let list_unsafe = list_delim.is_some_and(|delim| s.is_empty() || s.contains([delim, '"']));
            let plain = !list_unsafe && parse_scalar(s).as_ref() == Some(scalar);
            if plain {
                s.clone()
            } else {
                serde_json::Value::String(s.clone()).to_string()
            }
        }
    }
}

/// Split a list value on `delimiter`, ignoring delimiters inside JSON strings.
#[must_use]
pub fn split_list(raw: &str, delimiter: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in raw.chars() {
        if in_quotes {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_quotes = false;
            }
        } else if ch == delimiter {
            parts.push(std::mem::take(&mut current));
        } else {
            if ch == '"' {
                in_quotes = true;
            }
            current.push(ch);
        }
    }
    parts.push(current);
    parts
}

/// A single field / operator / value comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: FilterValue,
}

impl Condition {
    /// Build a condition; the operator gains its `$` prefix if missing.
    pub fn new(field: impl Into<String>, operator: &str, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            operator: normalize_operator_name(operator),
            value: value.into(),
        }
    }

    /// Build a value-less condition (`$isnull`, `$notnull`)
    pub fn unary(field: impl Into<String>, operator: &str) -> Self {
        Self {
            field: field.into(),
            operator: normalize_operator_name(operator),
            value: FilterValue::Null,
        }
    }

    /// Object form read back by `Deserialize`
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        json!({ "field": self.field, "operator": self.operator, "value": self.value.to_json() })
    }

    /// Search-object form: `{ field: { $op: value } }`
    #[must_use]
    pub fn to_search_json(&self) -> serde_json::Value {
        let value = match (&self.value, self.operator.as_str()) {
            (FilterValue::Null, "$isnull" | "$notnull") => json!(true),
            (value, _) => value.to_json(),
        };
        json!({ self.field.clone(): { self.operator.clone(): value } })
    }
}

/// Operator names are stored with their `$` prefix; `eq` and `$eq` are the same
/// operator.
#[must_use]
pub fn normalize_operator_name(name: &str) -> String {
    if name.starts_with('$') {
        name.to_string()
    } else {
        format!("${name}")
    }
}

/// AND/OR tree over conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum CombinatorNode {
    Leaf(Condition),
    And(Vec<CombinatorNode>),
    Or(Vec<CombinatorNode>),
}

impl Default for CombinatorNode {
    fn default() -> Self {
        Self::And(Vec::new())
    }
}

impl From<Condition> for CombinatorNode {
    fn from(condition: Condition) -> Self {
        Self::Leaf(condition)
    }
}

impl CombinatorNode {
    /// `true` for a tree that places no restriction (an empty group)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Leaf(_) => false,
            Self::And(children) => children.iter().all(Self::is_empty),
            // one unrestricted alternative makes the whole OR unrestricted
            Self::Or(children) => children.is_empty() || children.iter().any(Self::is_empty),
        }
    }

    /// Drop empty groups, flatten nested groups of the same kind and unwrap
    /// single-child groups. An OR with an empty alternative becomes empty.
    #[must_use]
    pub fn normalize(self) -> Self {
        match self {
            Self::Leaf(condition) => Self::Leaf(condition),
            Self::And(children) => Self::collapse(children, true),
            Self::Or(children) => Self::collapse(children, false),
        }
    }

    fn collapse(children: Vec<Self>, is_and: bool) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children.into_iter().map(Self::normalize) {
            if child.is_empty() {
                if is_and {
                    continue;
                }
                return Self::default();
            }
            match child {
                Self::And(grand) if is_and => flat.extend(grand),
                Self::Or(grand) if !is_and => flat.extend(grand),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        if is_and { Self::And(flat) } else { Self::Or(flat) }
    }

    /// Every condition in the tree, depth first
    #[must_use]
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            Self::Leaf(condition) => out.push(condition),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_conditions(out);
                }
            }
        }
    }

    /// Apply `f` to every condition, rebuilding the tree
    pub fn try_map<F>(self, f: &mut F) -> QueryResult<Self>
    where
        F: FnMut(Condition) -> QueryResult<Condition>,
    {
        Ok(match self {
            Self::Leaf(condition) => Self::Leaf(f(condition)?),
            Self::And(children) => Self::And(
                children
                    .into_iter()
                    .map(|child| child.try_map(f))
                    .collect::<QueryResult<_>>()?,
            ),
            Self::Or(children) => Self::Or(
                children
                    .into_iter()
                    .map(|child| child.try_map(f))
                    .collect::<QueryResult<_>>()?,
            ),
        })
    }

    /// Render the tree back into the search-object grammar
    #[must_use]
    pub fn to_search_json(&self) -> serde_json::Value {
        match self {
            Self::Leaf(condition) => condition.to_search_json(),
            Self::And(children) => {
                json!({ "$and": children.iter().map(Self::to_search_json).collect::<Vec<_>>() })
            }
            Self::Or(children) => {
                json!({ "$or": children.iter().map(Self::to_search_json).collect::<Vec<_>>() })
            }
        }
    }
}
