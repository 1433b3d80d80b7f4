//! Search-object compiler.
//!
//! Turns the JSON search grammar into a [`CombinatorNode`]:
//!
//! ```json
//! {
//!   "$or": [{ "name": { "$starts": "Jo" } }, { "age": { "$gte": 18 } }],
//!   "status": ["active", "pending"],
//!   "email": { "$contL": "@example.com", "$or": { "$isnull": true, "$ne": "" } },
//!   "manager_id": null
//! }
//! ```
//!
//! - `$and` elements are AND-combined with each other and with sibling keys.
//! - `$or` elements are OR-combined; the resulting group is AND-combined with
//!   sibling keys.
//! - A scalar is shorthand for `$eq`, an array for `$in`.
//! - An operator object yields one condition per key, AND-combined; a `$or`
//!   object inside it OR-combines its own keys.
//! - `null` compiles to `$eq` with a null value, which never matches.
//!
//! Field names are not checked here; the planner resolves them.

use serde_json::{Map, Value};

use super::conditions::{CombinatorNode, Condition, FilterValue};
use super::operators::OperatorRegistry;
use crate::errors::{QueryError, QueryResult};
use crate::models::CrudRequestQuery;

const MAX_SEARCH_DEPTH: usize = 16;

/// Compile a search object.
///
/// # Errors
///
/// - [`QueryError::Validation`] for a malformed object (unknown combinator,
///   empty operator object, wrong value shape for an operator)
/// - [`QueryError::UnknownOperator`] for an operator the registry lacks
pub fn compile_search(search: &Value, registry: &OperatorRegistry) -> QueryResult<CombinatorNode> {
    let object = search
        .as_object()
        .ok_or_else(|| QueryError::validation("search", "search must be a JSON object"))?;
    Ok(SearchCompiler { registry }.object(object, 0)?.normalize())
}

struct SearchCompiler<'a> {
    registry: &'a OperatorRegistry,
}

impl SearchCompiler<'_> {
    fn object(&self, object: &Map<String, Value>, depth: usize) -> QueryResult<CombinatorNode> {
        if depth > MAX_SEARCH_DEPTH {
            return Err(QueryError::validation("search", "search object is nested too deeply"));
        }

        let mut children = Vec::with_capacity(object.len());
        for (key, value) in object {
            match key.as_str() {
                "$and" => children.extend(self.group(key, value, depth)?),
                "$or" => children.push(CombinatorNode::Or(self.group(key, value, depth)?)),
                combinator if combinator.starts_with('$') => {
                    return Err(QueryError::validation(
                        combinator,
                        "unknown combinator; expected $and or $or",
                    ));
                }
                field => children.push(self.field(field, value)?),
            }
        }
        Ok(CombinatorNode::And(children))
    }

    /// Elements of a `$and` / `$or` array, each an implicit-AND group
    fn group(&self, key: &str, value: &Value, depth: usize) -> QueryResult<Vec<CombinatorNode>> {
        let items = value
            .as_array()
            .ok_or_else(|| QueryError::validation(key, "expected an array of objects"))?;
        items
            .iter()
            .map(|item| {
                item.as_object()
                    .ok_or_else(|| QueryError::validation(key, "expected an array of objects"))
                    .and_then(|object| self.object(object, depth + 1))
            })
            .collect()
    }

    fn field(&self, field: &str, value: &Value) -> QueryResult<CombinatorNode> {
        match value {
            Value::Object(operators) => self.operators(field, operators),
            Value::Array(_) => self.leaf(field, "$in", value),
            _ => self.leaf(field, "$eq", value),
        }
    }

    fn operators(&self, field: &str, operators: &Map<String, Value>) -> QueryResult<CombinatorNode> {
        if operators.is_empty() {
            return Err(QueryError::validation(field, "operator object must not be empty"));
        }

        let mut children = Vec::with_capacity(operators.len());
        for (operator, value) in operators {
            if operator == "$or" {
                let alternatives = value
                    .as_object()
                    .filter(|alternatives| !alternatives.is_empty())
                    .ok_or_else(|| {
                        QueryError::validation(field, "$or inside a field must be a non-empty operator object")
                    })?;
                let leaves = alternatives
                    .iter()
                    .map(|(operator, value)| self.operator_leaf(field, operator, value))
                    .collect::<QueryResult<Vec<_>>>()?;
                children.push(CombinatorNode::Or(leaves));
            } else {
                children.push(self.operator_leaf(field, operator, value)?);
            }
        }
        Ok(CombinatorNode::And(children))
    }

    fn operator_leaf(&self, field: &str, operator: &str, value: &Value) -> QueryResult<CombinatorNode> {
        if !operator.starts_with('$') {
            return Err(QueryError::validation(
                field,
                format!("nested object key '{operator}' is not an operator"),
            ));
        }
        self.leaf(field, operator, value)
    }

    fn leaf(&self, field: &str, operator: &str, value: &Value) -> QueryResult<CombinatorNode> {
        let condition = Condition {
            field: field.to_string(),
            operator: operator.to_string(),
            value: FilterValue::from_json(value, field)?,
        };
        Ok(CombinatorNode::Leaf(self.registry.validate(condition)?))
    }
}

/// Fold every source of conditions into one tree:
/// `And[path params, route default, request]`.
///
/// The request part is the `search` object when present (then `filter` and
/// `or` are ignored); otherwise `filter` and `or` together become
/// `Or(filters, ors)`, either alone is AND- (filters) or OR- (ors) combined.
///
/// # Errors
///
/// Propagates compile and validation failures of the search object and the
/// filter conditions.
pub fn assemble_search(
    params: Vec<Condition>,
    default_filter: &CombinatorNode,
    query: &CrudRequestQuery,
    registry: &OperatorRegistry,
) -> QueryResult<CombinatorNode> {
    let request = match &query.search {
        Some(search) => compile_search(search, registry)?,
        None => {
            let leaves = |conditions: &[Condition]| -> QueryResult<Vec<CombinatorNode>> {
                conditions
                    .iter()
                    .map(|c| registry.validate(c.clone()).map(CombinatorNode::Leaf))
                    .collect()
            };
            let filters = leaves(&query.filter)?;
            let ors = leaves(&query.or)?;
            match (filters.is_empty(), ors.is_empty()) {
                (false, false) => CombinatorNode::Or(vec![CombinatorNode::And(filters), CombinatorNode::Or(ors)]),
                (false, true) => CombinatorNode::And(filters),
                (true, false) => CombinatorNode::Or(ors),
                (true, true) => CombinatorNode::default(),
            }
        }
    };

    let mut children: Vec<CombinatorNode> = params.into_iter().map(CombinatorNode::Leaf).collect();
    children.push(default_filter.clone());
    children.push(request);
    Ok(CombinatorNode::And(children).normalize())
}
