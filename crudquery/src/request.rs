//! Request compilation: query string and path params in, a validated
//! [`ParsedRequestPayload`] out.
//!
//! ```rust
//! use crudquery::config::{ParamOption, ParamType, RouteOptions};
//! use crudquery::request::parse_request;
//! use crudquery::routes::{CrudAction, RouteRegistry};
//!
//! let mut registry = RouteRegistry::default();
//! let route = registry
//!     .register("users", RouteOptions::new("users").param("id", ParamOption::new("id", ParamType::Number)))
//!     .unwrap();
//!
//! let payload = parse_request("filter=name||$cont||jo&limit=5", &route, [("id", "7")], CrudAction::ReadOne).unwrap();
//! assert_eq!(payload.search.conditions().len(), 2);
//! assert_eq!(payload.pagination.limit, None);
//! ```

use crate::errors::{QueryError, QueryResult};
use crate::filtering::conditions::Condition;
use crate::filtering::joined::{FieldResolver, plan_joins};
use crate::filtering::pagination::PaginationSpec;
use crate::filtering::query_parser::QueryParser;
use crate::filtering::search::assemble_search;
use crate::filtering::select::plan_select;
use crate::filtering::sort::plan_sort;
use crate::models::{CrudRequestQuery, ParsedRequestPayload};
use crate::routes::{CrudAction, RouteConfig};
use crate::validation::{detect_sql_injection, validate_field_path};

/// Decode `query` and plan it against `route`.
///
/// `params` are the route's path parameters by name; each configured,
/// enabled param becomes an `$eq` condition on its field.
///
/// # Errors
///
/// Any [`QueryError`] from decoding or planning. Operators unknown to the
/// route are reported as [`QueryError::Validation`].
pub fn parse_request<I, K, V>(
    query: &str,
    route: &RouteConfig,
    params: I,
    action: CrudAction,
) -> QueryResult<ParsedRequestPayload>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let decoded = QueryParser::new(&route.parser, &route.operators)
        .decode(query)
        .map_err(unknown_operator_is_validation)?;
    plan_request(decoded, route, params, action)
}

/// Plan an already decoded request against `route`.
///
/// # Errors
///
/// As [`parse_request`].
pub fn plan_request<I, K, V>(
    query: CrudRequestQuery,
    route: &RouteConfig,
    params: I,
    action: CrudAction,
) -> QueryResult<ParsedRequestPayload>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    plan(query, route, &param_conditions(route, params)?, action).map_err(|err| {
        if err.is_client_error() {
            tracing::debug!(route = %route.name, error = %err, "Rejected request query");
        }
        unknown_operator_is_validation(err)
    })
}

fn param_conditions<I, K, V>(route: &RouteConfig, params: I) -> QueryResult<Vec<Condition>>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut conditions = Vec::new();
    for (name, raw) in params {
        let name = name.as_ref();
        let Some(option) = route.params.get(name) else {
            continue;
        };
        if option.disabled {
            continue;
        }
        let value = option.parse_value(name, raw.as_ref())?;
        conditions.push(Condition::new(option.field.clone(), "$eq", value));
    }
    Ok(conditions)
}

fn plan(
    query: CrudRequestQuery,
    route: &RouteConfig,
    params: &[Condition],
    action: CrudAction,
) -> QueryResult<ParsedRequestPayload> {
    let search = assemble_search(params.to_vec(), &route.default_filter, &query, &route.operators)?;
    let join = plan_joins(&query.join, route)?;
    let resolver = FieldResolver::new(&route.table, &join).with_schema(route.schema());

    for condition in search.conditions() {
        resolver.resolve(&condition.field)?;
    }
    for spec in &join {
        for condition in &spec.on {
            resolver.resolve_in(spec, &condition.field)?;
        }
    }

    for field in &query.fields {
        detect_sql_injection(field)?;
        validate_field_path(field)?;
    }
    let fields = plan_select(&query.fields, &route.query, &route.primary_keys, route.entity());

    let (sort, pagination) = if action.is_many() {
        (
            plan_sort(&query.sort, &route.query.sort, &resolver)?,
            PaginationSpec::resolve(&query, &route.query),
        )
    } else {
        (Vec::new(), PaginationSpec::default())
    };

    let cache = if action.is_read() && query.cache != Some(0) {
        route.query.cache_ttl()
    } else {
        None
    };
    let soft_delete_column = route.query.soft_delete_column().map(str::to_string);
    let include_deleted = soft_delete_column.is_some() && query.include_deleted.is_some_and(|flag| flag > 0);

    let payload = ParsedRequestPayload {
        table: route.table.clone(),
        fields,
        search,
        join,
        sort,
        pagination,
        cache,
        include_deleted,
        soft_delete_column,
    };
    tracing::debug!(
        route = %route.name,
        ?action,
        conditions = payload.search.conditions().len(),
        joins = payload.join.len(),
        "Planned request"
    );
    Ok(payload)
}

fn unknown_operator_is_validation(err: QueryError) -> QueryError {
    match err {
        QueryError::UnknownOperator { name } => {
            QueryError::validation("operator", format!("unknown operator '{name}'"))
        }
        other => other,
    }
}
