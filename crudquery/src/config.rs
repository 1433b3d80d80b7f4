//! Route configuration.
//!
//! [`CrudConfig`] holds process-wide defaults; [`RouteOptions`] describes one
//! route. Both deserialize with `serde` so they can live in a config file,
//! and [`crate::routes::RouteRegistry`] merges them into a resolved
//! [`crate::routes::RouteConfig`] at startup.
//!
//! ```rust
//! use crudquery::config::RouteOptions;
//!
//! let options: RouteOptions = serde_json::from_value(serde_json::json!({
//!     "table": "users",
//!     "query": {
//!         "exclude": ["password"],
//!         "join": { "company": { "eager": true }, "company.projects": {} },
//!         "sort": [{ "field": "name", "order": "ASC" }],
//!         "max_limit": 100
//!     },
//!     "params": { "id": { "field": "id", "type": "number", "primary": true } },
//!     "operators": { "$lengthGt": { "query": "LENGTH({field}) > :{param}" } }
//! }))
//! .unwrap();
//! assert_eq!(options.query.max_limit, Some(100));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::errors::{QueryError, QueryResult};
use crate::filtering::conditions::{Condition, FilterValue, Scalar};
use crate::filtering::operators::CustomOperator;
use crate::filtering::query_parser::ParserOptions;
use crate::models::QuerySort;

/// Column used for soft delete when a route enables it without naming one
pub const DEFAULT_SOFT_DELETE_COLUMN: &str = "deleted_at";

/// Process-wide defaults applied to every registered route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrudConfig {
    /// Defaults for `limit`, `max_limit`, `cache`, `always_paginate` and
    /// `soft_delete`; other fields are route-specific and ignored here
    pub query: QueryOptions,
    /// Params shared by every route (e.g. a tenant id in the path)
    pub params: BTreeMap<String, ParamOption>,
    pub parser: ParserOptions,
}

/// Per-route query options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Selectable columns; `None` allows all
    pub allow: Option<Vec<String>>,
    pub exclude: Vec<String>,
    /// Columns always selected
    pub persist: Vec<String>,
    /// Base filter AND-combined with every request
    pub filter: Option<DefaultFilter>,
    /// Joinable relations keyed by dotted path
    pub join: BTreeMap<String, JoinOption>,
    /// Sort used when the request has none
    pub sort: Vec<QuerySort>,
    pub limit: Option<u64>,
    pub max_limit: Option<u64>,
    /// Cache TTL in milliseconds; `0` disables caching
    pub cache: Option<u64>,
    pub always_paginate: Option<bool>,
    pub soft_delete: Option<bool>,
    pub soft_delete_column: Option<String>,
}

impl QueryOptions {
    /// Fill the unset global settings from `defaults`
    #[must_use]
    pub fn merged_with(mut self, defaults: &Self) -> Self {
        self.limit = self.limit.or(defaults.limit);
        self.max_limit = self.max_limit.or(defaults.max_limit);
        self.cache = self.cache.or(defaults.cache);
        self.always_paginate = self.always_paginate.or(defaults.always_paginate);
        self.soft_delete = self.soft_delete.or(defaults.soft_delete);
        self.soft_delete_column = self
            .soft_delete_column
            .or_else(|| defaults.soft_delete_column.clone());
        self
    }

    #[must_use]
    pub fn always_paginate(&self) -> bool {
        self.always_paginate.unwrap_or(false)
    }

    /// Soft-delete column, if the route enables soft delete
    #[must_use]
    pub fn soft_delete_column(&self) -> Option<&str> {
        self.soft_delete
            .unwrap_or(false)
            .then(|| self.soft_delete_column.as_deref().unwrap_or(DEFAULT_SOFT_DELETE_COLUMN))
    }

    /// Cache TTL, `None` when caching is off
    #[must_use]
    pub fn cache_ttl(&self) -> Option<u64> {
        self.cache.filter(|ttl| *ttl > 0)
    }
}

/// Options for one joinable relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinOption {
    pub alias: Option<String>,
    /// Selectable columns of the relation; `None` allows all
    pub allow: Option<Vec<String>>,
    pub exclude: Vec<String>,
    pub persist: Vec<String>,
    /// Join even when the request does not ask for it
    pub eager: bool,
    /// Inner join instead of left join
    pub required: bool,
    /// `false` joins for filtering only, selecting no columns
    pub select: bool,
}

impl Default for JoinOption {
    fn default() -> Self {
        Self {
            alias: None,
            allow: None,
            exclude: Vec::new(),
            persist: Vec::new(),
            eager: false,
            required: false,
            select: true,
        }
    }
}

/// Route default filter: a list of conditions (AND-combined) or a search
/// object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultFilter {
    Conditions(Vec<Condition>),
    Search(serde_json::Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Number,
    String,
    Uuid,
}

/// A path parameter that becomes an `$eq` condition on `field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamOption {
    pub field: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub primary: bool,
    /// Declared but not applied as a filter
    #[serde(default)]
    pub disabled: bool,
}

impl ParamOption {
    pub fn new(field: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            field: field.into(),
            param_type,
            primary: false,
            disabled: false,
        }
    }

    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Type a raw path segment into the condition value.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming `name` when the segment is not a
    /// valid number or UUID.
    pub fn parse_value(&self, name: &str, raw: &str) -> QueryResult<FilterValue> {
        let scalar = match self.param_type {
            ParamType::String => Scalar::Text(raw.to_string()),
            ParamType::Number => raw
                .parse::<i64>()
                .map(Scalar::Int)
                .or_else(|_| raw.parse::<f64>().map(Scalar::Float))
                .ok()
                .filter(|s| !matches!(s, Scalar::Float(f) if !f.is_finite()))
                .ok_or_else(|| QueryError::validation(name, format!("invalid number '{raw}'")))?,
            ParamType::Uuid => Uuid::parse_str(raw)
                .map(|id| Scalar::Text(id.to_string()))
                .map_err(|_| QueryError::validation(name, format!("invalid UUID '{raw}'")))?,
        };
        Ok(FilterValue::Scalar(scalar))
    }
}

/// A custom operator declared in a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomOperatorConfig {
    #[serde(default)]
    pub is_array: bool,
    /// Template with `{field}` and `{param}` markers
    pub query: String,
}

/// Everything declared for one route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteOptions {
    /// Base table
    pub table: String,
    pub query: QueryOptions,
    pub params: BTreeMap<String, ParamOption>,
    /// Template-based custom operators keyed by name
    pub operators: BTreeMap<String, CustomOperatorConfig>,
    /// Closure-based custom operators, set in code
    #[serde(skip)]
    pub custom_operators: Vec<CustomOperator>,
}

impl RouteOptions {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn query(mut self, query: QueryOptions) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn param(mut self, name: &str, param: ParamOption) -> Self {
        self.params.insert(name.to_string(), param);
        self
    }

    #[must_use]
    pub fn operator(mut self, operator: CustomOperator) -> Self {
        self.custom_operators.push(operator);
        self
    }

    /// Every custom operator, config-file templates first
    #[must_use]
    pub fn all_custom_operators(&self) -> Vec<CustomOperator> {
        self.operators
            .iter()
            .map(|(name, op)| CustomOperator::template(name, op.is_array, &op.query))
            .chain(self.custom_operators.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_fills_unset_defaults() {
        let defaults = QueryOptions {
            limit: Some(25),
            max_limit: Some(100),
            cache: Some(2000),
            always_paginate: Some(true),
            ..QueryOptions::default()
        };
        let route = QueryOptions {
            max_limit: Some(5),
            ..QueryOptions::default()
        }
        .merged_with(&defaults);

        assert_eq!(route.limit, Some(25));
        assert_eq!(route.max_limit, Some(5));
        assert_eq!(route.cache_ttl(), Some(2000));
        assert!(route.always_paginate());
        assert_eq!(route.soft_delete_column(), None);
    }

    #[test]
    fn test_soft_delete_column_default() {
        let options = QueryOptions {
            soft_delete: Some(true),
            ..QueryOptions::default()
        };
        assert_eq!(options.soft_delete_column(), Some(DEFAULT_SOFT_DELETE_COLUMN));
    }

    #[test]
    fn test_zero_cache_disables() {
        let options = QueryOptions {
            cache: Some(0),
            ..QueryOptions::default()
        };
        assert_eq!(options.cache_ttl(), None);
    }

    #[test]
    fn test_default_filter_forms() {
        let list: DefaultFilter =
            serde_json::from_value(json!([{"field": "active", "operator": "$eq", "value": true}])).unwrap();
        assert!(matches!(list, DefaultFilter::Conditions(ref c) if c.len() == 1));

        let search: DefaultFilter = serde_json::from_value(json!({"active": true})).unwrap();
        assert!(matches!(search, DefaultFilter::Search(_)));
    }

    #[test]
    fn test_join_option_defaults_select_true() {
        let option: JoinOption = serde_json::from_value(json!({"eager": true})).unwrap();
        assert!(option.select);
        assert!(option.eager);
        assert!(!option.required);
    }

    #[test]
    fn test_param_typing() {
        let id = ParamOption::new("id", ParamType::Number);
        assert_eq!(id.parse_value("id", "42").unwrap(), FilterValue::from(42_i64));
        assert!(matches!(id.parse_value("id", "abc"), Err(QueryError::Validation(_))));

        let uuid = ParamOption::new("id", ParamType::Uuid);
        assert!(uuid.parse_value("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(matches!(uuid.parse_value("id", "not-a-uuid"), Err(QueryError::Validation(_))));

        let slug = ParamOption::new("slug", ParamType::String);
        assert_eq!(slug.parse_value("slug", "42").unwrap(), FilterValue::from("42"));
    }

    #[test]
    fn test_template_operators_from_config() {
        let options: RouteOptions = serde_json::from_value(json!({
            "table": "users",
            "operators": {"lengthGt": {"query": "LENGTH({field}) > :{param}"}}
        }))
        .unwrap();
        let ops = options.all_custom_operators();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].name(), "$lengthGt");
        assert_eq!(ops[0].render("\"name\"", "p"), "LENGTH(\"name\") > :p");
    }
}
