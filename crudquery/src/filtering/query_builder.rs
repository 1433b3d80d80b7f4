//! Query string encoding, the inverse of [`super::query_parser`].
//!
//! ```rust
//! use crudquery::filtering::query_builder::RequestQueryBuilder;
//! use crudquery::filtering::conditions::Condition;
//! use crudquery::models::{QuerySort, SortOrder};
//!
//! let query = RequestQueryBuilder::new()
//!     .select(["id", "name"])
//!     .filter(Condition::new("name", "$cont", "john"))
//!     .sort(QuerySort::new("name", SortOrder::Asc))
//!     .limit(10)
//!     .build();
//! assert_eq!(query, "fields=id%2Cname&filter=name%7C%7C%24cont%7C%7Cjohn&sort=name%2CASC&limit=10");
//! ```

use super::conditions::{Condition, FilterValue, format_scalar};
use super::query_parser::{ParamKind, ParserOptions};
use crate::models::{CrudRequestQuery, QueryJoin, QuerySort};

/// Builds the query string for a request.
#[derive(Debug, Clone, Default)]
pub struct RequestQueryBuilder {
    options: ParserOptions,
    query: CrudRequestQuery,
}

impl RequestQueryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_options(options: ParserOptions) -> Self {
        Self {
            options,
            query: CrudRequestQuery::default(),
        }
    }

    /// Start from an existing request
    #[must_use]
    pub fn from_query(query: CrudRequestQuery, options: ParserOptions) -> Self {
        Self { options, query }
    }

    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Set the search object; `filter` and `or` are ignored by the server
    /// when a search is present
    #[must_use]
    pub fn search(mut self, search: serde_json::Value) -> Self {
        self.query.search = Some(search);
        self
    }

    #[must_use]
    pub fn filter(mut self, condition: Condition) -> Self {
        self.query.filter.push(condition);
        self
    }

    #[must_use]
    pub fn or(mut self, condition: Condition) -> Self {
        self.query.or.push(condition);
        self
    }

    #[must_use]
    pub fn join(mut self, join: QueryJoin) -> Self {
        self.query.join.push(join);
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: QuerySort) -> Self {
        self.query.sort.push(sort);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.query.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn page(mut self, page: u64) -> Self {
        self.query.page = Some(page);
        self
    }

    /// Ask the server to bypass its result cache
    #[must_use]
    pub fn reset_cache(mut self) -> Self {
        self.query.cache = Some(0);
        self
    }

    #[must_use]
    pub fn include_deleted(mut self) -> Self {
        self.query.include_deleted = Some(1);
        self
    }

    fn condition_token(&self, condition: &Condition) -> String {
        let delim = &self.options.delim;
        let head = format!("{}{delim}{}", condition.field, condition.operator);
        match &condition.value {
            FilterValue::Null if matches!(condition.operator.as_str(), "$isnull" | "$notnull") => head,
            FilterValue::Null => format!("{head}{delim}null"),
            FilterValue::Scalar(scalar) => format!("{head}{delim}{}", format_scalar(scalar, None)),
            FilterValue::List(items) => {
                let list_delim = Some(self.options.delim_list);
                format!("{head}{delim}{}", self.list(items.iter().map(|s| format_scalar(s, list_delim))))
            }
        }
    }

    fn join_token(&self, join: &QueryJoin) -> String {
        let delim = &self.options.delim;
        let mut token = join.field.clone();
        let select = join.select.as_deref().unwrap_or_default();
        if !select.is_empty() || !join.on.is_empty() {
            token.push_str(delim);
            token.push_str(&self.list(select.iter().cloned()));
        }
        if !join.on.is_empty() {
            token.push_str(delim);
            let on = join.on.iter().map(Condition::to_json).collect();
            token.push_str(&serde_json::Value::Array(on).to_string());
        }
        token
    }

    fn list(&self, items: impl Iterator<Item = String>) -> String {
        items.collect::<Vec<_>>().join(&self.options.delim_list.to_string())
    }

    /// Render the URL-encoded query string (without a leading `?`)
    #[must_use]
    pub fn build(&self) -> String {
        let names = &self.options.params;
        let query = &self.query;
        let mut out = url::form_urlencoded::Serializer::new(String::new());

        if !query.fields.is_empty() {
            out.append_pair(names.primary(ParamKind::Fields), &self.list(query.fields.iter().cloned()));
        }
        if let Some(search) = &query.search {
            out.append_pair(names.primary(ParamKind::Search), &search.to_string());
        }
        for condition in &query.filter {
            out.append_pair(names.primary(ParamKind::Filter), &self.condition_token(condition));
        }
        for condition in &query.or {
            out.append_pair(names.primary(ParamKind::Or), &self.condition_token(condition));
        }
        for join in &query.join {
            out.append_pair(names.primary(ParamKind::Join), &self.join_token(join));
        }
        for sort in &query.sort {
            let token = format!("{}{}{}", sort.field, self.options.delim_list, sort.order.as_str());
            out.append_pair(names.primary(ParamKind::Sort), &token);
        }
        let numbers = [
            (ParamKind::Limit, query.limit),
            (ParamKind::Offset, query.offset),
            (ParamKind::Page, query.page),
            (ParamKind::Cache, query.cache),
            (ParamKind::IncludeDeleted, query.include_deleted),
        ];
        for (kind, value) in numbers {
            if let Some(value) = value {
                out.append_pair(names.primary(kind), &value.to_string());
            }
        }
        out.finish()
    }
}

/// Encode a request with the given grammar options.
#[must_use]
pub fn encode(query: &CrudRequestQuery, options: &ParserOptions) -> String {
    RequestQueryBuilder::from_query(query.clone(), options.clone()).build()
}
