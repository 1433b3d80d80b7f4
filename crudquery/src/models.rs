use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::{IntoParams, ToSchema};

use crate::database::metadata::RelationMeta;
use crate::filtering::conditions::{CombinatorNode, Condition};
use crate::filtering::pagination::PaginationSpec;

/// Query string parameters understood by the request compiler.
///
/// This struct documents the wire format for `OpenAPI`; decoding goes through
/// [`crate::filtering::query_parser`], which also accepts the aliases and
/// bracketed repeat forms (`filter[]`, `filter[0]`).
///
/// # Filtering
/// `filter` and `or` take `field||$operator||value` tokens and may repeat:
/// ```text
/// ?filter=name||$cont||john&filter=age||$gte||18
/// ?filter=id||$in||1,2,3
/// ?filter=deleted_at||$isnull
/// ```
/// Repeated `filter` tokens are AND-combined. When both `filter` and `or` are
/// present the two groups are OR-combined.
///
/// # Search
/// `s` takes a JSON search object and replaces `filter`/`or` entirely:
/// ```json
/// {"$or": [{"name": {"$contL": "john"}}, {"age": {"$gte": 18}}], "active": true}
/// ```
///
/// # Joins
/// `join=relation||col1,col2` joins an allowed relation, optionally selecting
/// columns. Nested relations use dotted paths: `join=company&join=company.projects`.
///
/// # Sorting and pagination
/// `sort=field,ASC` (repeatable), `limit` (alias `per_page`), `offset`, `page`.
#[derive(Deserialize, IntoParams, ToSchema, Default)]
#[into_params(parameter_in = Query)]
pub struct CrudQueryParams {
    /// Columns to return, comma separated. Alias: `select`.
    #[param(example = "id,name,email")]
    pub fields: Option<String>,
    /// JSON search object; overrides `filter` and `or`.
    #[param(example = r#"{"name": {"$starts": "Jo"}}"#)]
    pub s: Option<String>,
    /// Filter tokens, AND-combined.
    #[param(example = json!(["name||$cont||john", "age||$gte||18"]))]
    pub filter: Option<Vec<String>>,
    /// Filter tokens, OR-combined.
    #[param(example = json!(["role||$eq||admin"]))]
    pub or: Option<Vec<String>>,
    /// Relations to join.
    #[param(example = json!(["company||name", "company.projects"]))]
    pub join: Option<Vec<String>>,
    /// Sort tokens in precedence order.
    #[param(example = json!(["name,ASC", "id,DESC"]))]
    pub sort: Option<Vec<String>>,
    /// Page size. Alias: `per_page`.
    #[param(example = 10)]
    pub limit: Option<u64>,
    #[param(example = 20)]
    pub offset: Option<u64>,
    /// 1-based page number; takes precedence over `offset`.
    #[param(example = 1)]
    pub page: Option<u64>,
    /// `0` bypasses the route's result cache.
    #[param(example = 0)]
    pub cache: Option<u64>,
    /// `1` includes soft-deleted rows when the route supports soft delete.
    #[param(example = 1)]
    pub include_deleted: Option<u64>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Case-insensitive `ASC` / `DESC`
    #[must_use]
    pub fn parse(order: &str) -> Option<Self> {
        if order.eq_ignore_ascii_case("ASC") {
            Some(Self::Asc)
        } else if order.eq_ignore_ascii_case("DESC") {
            Some(Self::Desc)
        } else {
            None
        }
    }
}

impl From<SortOrder> for sea_orm::Order {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Asc => Self::Asc,
            SortOrder::Desc => Self::Desc,
        }
    }
}

/// One `sort` token as requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuerySort {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl QuerySort {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

/// One `join` token as requested.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryJoin {
    /// Dotted relation path
    pub field: String,
    pub select: Option<Vec<String>>,
    /// Extra conditions on the joined relation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on: Vec<Condition>,
}

impl QueryJoin {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.select = (!columns.is_empty()).then_some(columns);
        self
    }

    #[must_use]
    pub fn on(mut self, condition: Condition) -> Self {
        self.on.push(condition);
        self
    }
}

/// The decoded request: everything the query string (or an equivalent
/// structured object) asked for, before route validation.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrudRequestQuery {
    pub fields: Vec<String>,
    /// Raw search object; compiled by [`crate::filtering::search`]
    pub search: Option<serde_json::Value>,
    pub filter: Vec<Condition>,
    pub or: Vec<Condition>,
    pub join: Vec<QueryJoin>,
    pub sort: Vec<QuerySort>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub page: Option<u64>,
    pub cache: Option<u64>,
    pub include_deleted: Option<u64>,
}

/// A validated join.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinSpec {
    /// Dotted relation path
    pub field: String,
    pub alias: String,
    /// `None` selects every column, an empty list selects none (filter-only join)
    pub select: Option<Vec<String>>,
    pub eager: bool,
    /// Inner join instead of left join
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub on: Vec<Condition>,
    /// Key columns, known when entity metadata is registered
    #[serde(skip)]
    pub relation: Option<RelationMeta>,
}

impl JoinSpec {
    /// Dotted path of the parent join, `None` for a join on the base entity
    #[must_use]
    pub fn parent_path(&self) -> Option<&str> {
        self.field.rsplit_once('.').map(|(parent, _)| parent)
    }
}

/// A validated sort entry; appearance order is ORDER BY precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

/// The compiled request handed to the execution layer.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRequestPayload {
    /// Base table the field references resolve against
    pub table: String,
    /// Selected base columns; empty selects every column
    pub fields: Vec<String>,
    #[serde(skip)]
    pub search: CombinatorNode,
    pub join: Vec<JoinSpec>,
    pub sort: Vec<SortSpec>,
    pub pagination: PaginationSpec,
    /// Cache TTL in milliseconds
    pub cache: Option<u64>,
    pub include_deleted: bool,
    /// Column marking soft-deleted rows, when the route supports soft delete
    pub soft_delete_column: Option<String>,
}

impl ParsedRequestPayload {
    /// Search tree in the JSON search grammar, for logging and debugging
    #[must_use]
    pub fn search_json(&self) -> serde_json::Value {
        self.search.to_search_json()
    }
}
