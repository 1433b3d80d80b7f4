//! Query string decoding.
//!
//! ```text
//! ?fields=id,name
//! &filter=name||$cont||john&filter=age||gte||18
//! &or=role||$in||admin,owner
//! &join=company||name&join=company.projects
//! &sort=name,ASC&sort=id,DESC
//! &limit=10&page=2
//! ```
//!
//! Any malformed token fails the whole decode with a validation error naming
//! the token; nothing is partially applied.

use serde::{Deserialize, Serialize};

use super::conditions::{Condition, FilterValue, Scalar, parse_scalar, split_list};
use super::operators::{Arity, OperatorRegistry};
use crate::errors::{QueryError, QueryResult};
use crate::models::{CrudRequestQuery, QueryJoin, QuerySort, SortOrder};

// Basic safety limits
const MAX_QUERY_STRING_LENGTH: usize = 16_384;
const MAX_REPEATED_TOKENS: usize = 100;

/// Accepted names for each query parameter. The first name of each list is
/// the one written when encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamNames {
    pub fields: Vec<String>,
    pub search: Vec<String>,
    pub filter: Vec<String>,
    pub or: Vec<String>,
    pub join: Vec<String>,
    pub sort: Vec<String>,
    pub limit: Vec<String>,
    pub offset: Vec<String>,
    pub page: Vec<String>,
    pub cache: Vec<String>,
    pub include_deleted: Vec<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

impl Default for ParamNames {
    fn default() -> Self {
        Self {
            fields: names(&["fields", "select"]),
            search: names(&["s", "search"]),
            filter: names(&["filter"]),
            or: names(&["or"]),
            join: names(&["join"]),
            sort: names(&["sort"]),
            limit: names(&["limit", "per_page"]),
            offset: names(&["offset"]),
            page: names(&["page"]),
            cache: names(&["cache"]),
            include_deleted: names(&["include_deleted"]),
        }
    }
}

/// Which request slot a query parameter fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamKind {
    Fields,
    Search,
    Filter,
    Or,
    Join,
    Sort,
    Limit,
    Offset,
    Page,
    Cache,
    IncludeDeleted,
}

impl ParamNames {
    fn table(&self) -> [(ParamKind, &[String]); 11] {
        [
            (ParamKind::Fields, self.fields.as_slice()),
            (ParamKind::Search, self.search.as_slice()),
            (ParamKind::Filter, self.filter.as_slice()),
            (ParamKind::Or, self.or.as_slice()),
            (ParamKind::Join, self.join.as_slice()),
            (ParamKind::Sort, self.sort.as_slice()),
            (ParamKind::Limit, self.limit.as_slice()),
            (ParamKind::Offset, self.offset.as_slice()),
            (ParamKind::Page, self.page.as_slice()),
            (ParamKind::Cache, self.cache.as_slice()),
            (ParamKind::IncludeDeleted, self.include_deleted.as_slice()),
        ]
    }

    fn kind_of(&self, key: &str) -> Option<ParamKind> {
        self.table()
            .into_iter()
            .find(|(_, aliases)| aliases.iter().any(|alias| alias == key))
            .map(|(kind, _)| kind)
    }

    /// Name written by the encoder
    pub(crate) fn primary(&self, kind: ParamKind) -> &str {
        self.table()
            .into_iter()
            .find(|(k, _)| *k == kind)
            .and_then(|(_, aliases)| aliases.first())
            .map_or("", String::as_str)
    }
}

/// Parameter names and delimiters of the query grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    pub params: ParamNames,
    /// Separator between the parts of a filter or join token
    pub delim: String,
    /// Separator inside lists
    pub delim_list: char,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            params: ParamNames::default(),
            delim: "||".to_string(),
            delim_list: ',',
        }
    }
}

/// `filter[]` and `filter[3]` both name `filter`
fn strip_index(key: &str) -> &str {
    match key.find('[') {
        Some(open)
            if key.ends_with(']')
                && key[open + 1..key.len() - 1].chars().all(|c| c.is_ascii_digit()) =>
        {
            &key[..open]
        }
        _ => key,
    }
}

/// Decodes query strings against one route's operator registry.
#[derive(Debug, Clone, Copy)]
pub struct QueryParser<'a> {
    options: &'a ParserOptions,
    registry: &'a OperatorRegistry,
}

impl<'a> QueryParser<'a> {
    #[must_use]
    pub fn new(options: &'a ParserOptions, registry: &'a OperatorRegistry) -> Self {
        Self { options, registry }
    }

    /// Decode a raw query string; a leading `?` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Validation`] naming the first malformed token.
    pub fn decode(&self, query: &str) -> QueryResult<CrudRequestQuery> {
        let query = query.strip_prefix('?').unwrap_or(query);
        if query.len() > MAX_QUERY_STRING_LENGTH {
            return Err(QueryError::validation("query", "query string is too long"));
        }

        let mut request = CrudRequestQuery::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let Some(kind) = self.options.params.kind_of(strip_index(&key)) else {
                continue;
            };
            self.apply(&mut request, kind, &key, &value)?;
        }

        let repeated = request.filter.len() + request.or.len() + request.join.len() + request.sort.len();
        if repeated > MAX_REPEATED_TOKENS {
            return Err(QueryError::validation("query", "too many filter, join or sort tokens"));
        }
        Ok(request)
    }

    fn apply(&self, request: &mut CrudRequestQuery, kind: ParamKind, key: &str, value: &str) -> QueryResult<()> {
        match kind {
            ParamKind::Fields => request.fields.extend(
                value
                    .split(self.options.delim_list)
                    .map(str::trim)
                    .filter(|field| !field.is_empty())
                    .map(str::to_string),
            ),
            ParamKind::Search => request.search = Some(parse_search(key, value)?),
            ParamKind::Filter => request.filter.push(self.parse_condition(key, value)?),
            ParamKind::Or => request.or.push(self.parse_condition(key, value)?),
            ParamKind::Join => request.join.push(self.parse_join(key, value)?),
            ParamKind::Sort => request.sort.push(self.parse_sort(key, value)?),
            ParamKind::Limit => request.limit = Some(parse_number(key, value)?),
            ParamKind::Offset => request.offset = Some(parse_number(key, value)?),
            ParamKind::Page => request.page = Some(parse_number(key, value)?),
            ParamKind::Cache => request.cache = Some(parse_number(key, value)?),
            ParamKind::IncludeDeleted => request.include_deleted = Some(parse_number(key, value)?),
        }
        Ok(())
    }

    /// `field||$op||value`, value optional for value-less operators
    fn parse_condition(&self, key: &str, token: &str) -> QueryResult<Condition> {
        let invalid = |message: String| QueryError::validation(format!("{key}={token}"), message);

        let mut parts = token.splitn(3, self.options.delim.as_str());
        let field = parts.next().unwrap_or_default().trim();
        let operator = parts.next().unwrap_or_default().trim();
        let raw = parts.next();

        if field.is_empty() {
            return Err(invalid("missing field".to_string()));
        }
        if operator.is_empty() {
            return Err(invalid("missing operator".to_string()));
        }
        let definition = self
            .registry
            .lookup(operator)
            .map_err(|_| invalid(format!("unknown operator '{operator}'")))?;

        let value = match (definition.arity(), raw) {
            (Arity::Unary, _) => FilterValue::Null,
            (_, None) => return Err(invalid("missing value".to_string())),
            (Arity::List | Arity::Pair, Some("")) => FilterValue::List(Vec::new()),
            (Arity::List | Arity::Pair, Some(raw)) => FilterValue::List(
                split_list(raw, self.options.delim_list)
                    .iter()
                    .map(|item| {
                        parse_scalar(item).ok_or_else(|| invalid("null is not allowed inside a list".to_string()))
                    })
                    .collect::<QueryResult<Vec<Scalar>>>()?,
            ),
            (Arity::Scalar, Some(raw)) => parse_scalar(raw).map_or(FilterValue::Null, FilterValue::Scalar),
        };

        let condition = Condition {
            field: field.to_string(),
            operator: definition.name().to_string(),
            value,
        };
        self.registry.validate(condition).map_err(|err| match err {
            QueryError::Validation(inner) => invalid(inner.message),
            other => other,
        })
    }

    /// `relation||col1,col2||[{"field":..,"operator":..,"value":..}]`
    fn parse_join(&self, key: &str, token: &str) -> QueryResult<QueryJoin> {
        let invalid = |message: String| QueryError::validation(format!("{key}={token}"), message);

        let mut parts = token.splitn(3, self.options.delim.as_str());
        let field = parts.next().unwrap_or_default().trim();
        if field.is_empty() {
            return Err(invalid("missing relation".to_string()));
        }

        let mut join = QueryJoin::new(field);
        if let Some(select) = parts.next() {
            join = join.select(
                select
                    .split(self.options.delim_list)
                    .map(str::trim)
                    .filter(|column| !column.is_empty()),
            );
        }
        if let Some(on) = parts.next().filter(|on| !on.trim().is_empty()) {
            let conditions: Vec<Condition> = serde_json::from_str(on)
                .map_err(|err| invalid(format!("invalid join condition JSON: {err}")))?;
            join.on = conditions
                .into_iter()
                .map(|condition| {
                    self.registry.validate(condition).map_err(|err| match err {
                        QueryError::Validation(inner) => invalid(inner.message),
                        QueryError::UnknownOperator { name } => invalid(format!("unknown operator '{name}'")),
                        other => other,
                    })
                })
                .collect::<QueryResult<_>>()?;
        }
        Ok(join)
    }

    /// `field,ASC`
    fn parse_sort(&self, key: &str, token: &str) -> QueryResult<QuerySort> {
        let invalid = |message: &str| QueryError::validation(format!("{key}={token}"), message);

        let parts: Vec<&str> = token.split(self.options.delim_list).collect();
        let [field, order] = parts.as_slice() else {
            return Err(invalid("expected field,ASC|DESC"));
        };
        if field.is_empty() {
            return Err(invalid("missing sort field"));
        }
        let order = SortOrder::parse(order.trim()).ok_or_else(|| invalid("sort order must be ASC or DESC"))?;
        Ok(QuerySort::new(*field, order))
    }
}

fn parse_search(key: &str, value: &str) -> QueryResult<serde_json::Value> {
    let parsed: serde_json::Value = serde_json::from_str(value)
        .map_err(|err| QueryError::validation(key, format!("invalid search JSON: {err}")))?;
    if !parsed.is_object() {
        return Err(QueryError::validation(key, "search must be a JSON object"));
    }
    Ok(parsed)
}

fn parse_number(key: &str, value: &str) -> QueryResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| QueryError::validation(format!("{key}={value}"), "must be a non-negative integer"))
}

/// Decode with the default grammar and the built-in operators only.
///
/// # Errors
///
/// Returns [`QueryError::Validation`] naming the first malformed token.
pub fn decode(query: &str, options: &ParserOptions) -> QueryResult<CrudRequestQuery> {
    QueryParser::new(options, &OperatorRegistry::builtin()).decode(query)
}
