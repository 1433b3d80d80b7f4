//! Join planning and field resolution.
//!
//! Requested joins are matched against the route's join options, ordered
//! parents-first and turned into [`JoinSpec`]s. Field paths used by filters,
//! sort and join conditions then resolve through [`FieldResolver`]:
//!
//! - `name` is a column of the base table
//! - `company.name` is a column of the join with path or alias `company`
//! - `company.projects.title` is a column of the join `company.projects`

use std::collections::{HashMap, HashSet};

use super::operators::FieldRef;
use super::select::merge_columns;
use crate::config::JoinOption;
use crate::database::metadata::{EntityMeta, RelationMeta, Schema};
use crate::errors::{QueryError, QueryResult};
use crate::models::{JoinSpec, QueryJoin};
use crate::routes::RouteConfig;
use crate::validation::{detect_sql_injection, validate_field_path};

struct Candidate<'a> {
    path: &'a str,
    option: &'a JoinOption,
    request: Option<&'a QueryJoin>,
}

/// Validate requested joins against the route and add its eager joins.
///
/// Joins the route does not allow are skipped. The returned joins are ordered
/// so that a parent always precedes its children.
///
/// # Errors
///
/// - [`QueryError::InvalidJoin`] when a nested join's parent is not joined,
///   a relation is unknown to the entity metadata, or two joins share an alias
/// - [`QueryError::Validation`] for malformed paths or join conditions
pub fn plan_joins(requested: &[QueryJoin], route: &RouteConfig) -> QueryResult<Vec<JoinSpec>> {
    let options = &route.query.join;

    let mut candidates: Vec<Candidate<'_>> = options
        .iter()
        .filter(|(_, option)| option.eager)
        .map(|(path, option)| Candidate {
            path,
            option,
            request: requested.iter().find(|join| &join.field == path),
        })
        .collect();

    for join in requested {
        let Some((path, option)) = options.get_key_value(&join.field) else {
            tracing::debug!(route = %route.name, join = %join.field, "Ignoring join not allowed by route");
            continue;
        };
        if candidates.iter().any(|candidate| candidate.path == path.as_str()) {
            continue;
        }
        candidates.push(Candidate {
            path,
            option,
            request: Some(join),
        });
    }

    // Stable: siblings keep their request order
    candidates.sort_by_key(|candidate| candidate.path.matches('.').count());
    let joined: HashSet<&str> = candidates.iter().map(|candidate| candidate.path).collect();

    let schema = route.schema();
    let mut targets: HashMap<&str, String> = HashMap::new();
    let mut aliases: HashSet<String> = HashSet::from([route.table.clone()]);
    let mut specs = Vec::with_capacity(candidates.len());

    for Candidate { path, option, request } in candidates {
        validate_field_path(path)?;
        let (parent, name) = match path.rsplit_once('.') {
            Some((parent, name)) => (Some(parent), name),
            None => (None, path),
        };
        if let Some(parent) = parent {
            if !joined.contains(parent) {
                return Err(QueryError::invalid_join(
                    path,
                    format!("parent relation '{parent}' is not joined"),
                ));
            }
        }

        let owner = match parent {
            None => Some(route.table.as_str()),
            Some(parent) => targets.get(parent).map(String::as_str),
        };
        let (relation, target) = match (schema, owner) {
            (Some(schema), Some(owner)) if schema.entity(owner).is_some() => {
                let (relation, target) = schema.related(owner, name).ok_or_else(|| {
                    QueryError::invalid_join(path, format!("'{owner}' has no relation '{name}'"))
                })?;
                (Some(relation.clone()), target)
            }
            _ => (None, None),
        };
        if let Some(relation) = &relation {
            targets.insert(path, relation.target.clone());
        }

        let alias = option.alias.clone().unwrap_or_else(|| name.to_string());
        if !aliases.insert(alias.clone()) {
            return Err(QueryError::invalid_join(path, format!("alias '{alias}' is already used")));
        }

        let on = request
            .map(|join| {
                join.on
                    .iter()
                    .map(|condition| {
                        validate_field_path(&condition.field)?;
                        route.operators.validate(condition.clone())
                    })
                    .collect::<QueryResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        specs.push(JoinSpec {
            field: path.to_string(),
            select: join_select(option, request, target),
            alias,
            eager: option.eager,
            required: option.required,
            on,
            relation,
        });
    }

    tracing::debug!(
        route = %route.name,
        joins = ?specs.iter().map(|spec| spec.field.as_str()).collect::<Vec<_>>(),
        "Planned joins"
    );
    Ok(specs)
}

/// Columns selected from a join; `None` selects all of them.
fn join_select(option: &JoinOption, request: Option<&QueryJoin>, target: Option<&EntityMeta>) -> Option<Vec<String>> {
    if !option.select {
        return Some(Vec::new());
    }
    let not_excluded = |column: &String| !option.exclude.contains(column);

    let allowed: Option<Vec<String>> = match (target, &option.allow) {
        (Some(meta), allow) => Some(
            meta.columns
                .iter()
                .filter(|column| allow.as_ref().is_none_or(|allow| allow.contains(column)))
                .cloned()
                .collect(),
        ),
        (None, Some(allow)) => Some(allow.clone()),
        (None, None) => None,
    }
    .map(|columns| columns.into_iter().filter(not_excluded).collect());

    let requested = request.and_then(|join| join.select.as_ref());
    let columns: Vec<String> = match (allowed, requested) {
        (Some(allowed), Some(requested)) => allowed.into_iter().filter(|c| requested.contains(c)).collect(),
        (Some(allowed), None) => allowed,
        (None, Some(requested)) => requested.iter().filter(|c| not_excluded(c)).cloned().collect(),
        (None, None) => return None,
    };
    let primary_keys = target.map(|meta| meta.primary_keys.as_slice()).unwrap_or_default();
    Some(merge_columns(&option.persist, columns, primary_keys))
}

/// Maps field paths to qualified column references.
#[derive(Debug, Clone, Copy)]
pub struct FieldResolver<'a> {
    table: &'a str,
    joins: &'a [JoinSpec],
    schema: Option<&'a Schema>,
}

impl<'a> FieldResolver<'a> {
    #[must_use]
    pub fn new(table: &'a str, joins: &'a [JoinSpec]) -> Self {
        Self {
            table,
            joins,
            schema: None,
        }
    }

    /// Also check that columns exist, for entities the schema knows
    #[must_use]
    pub fn with_schema(mut self, schema: Option<&'a Schema>) -> Self {
        self.schema = schema;
        self
    }

    fn check_column(&self, table: &str, field: &str, column: &str) -> QueryResult<()> {
        let entity = self.schema.and_then(|schema| schema.entity(table));
        if entity.is_some_and(|entity| !entity.has_column(column)) {
            return Err(QueryError::validation(field, format!("unknown column '{column}'")));
        }
        Ok(())
    }

    /// Resolve `field` against the base table and the planned joins.
    ///
    /// # Errors
    ///
    /// - [`QueryError::Validation`] for a malformed path or an unknown column
    /// - [`QueryError::InvalidJoin`] when the relation part is not joined
    pub fn resolve(&self, field: &str) -> QueryResult<FieldRef> {
        detect_sql_injection(field)?;
        validate_field_path(field)?;

        let Some((path, column)) = field.rsplit_once('.') else {
            self.check_column(self.table, field, field)?;
            return Ok(FieldRef::new(Some(self.table), field));
        };
        let join = self.join(path).ok_or_else(|| {
            QueryError::invalid_join(path, format!("relation is not joined (referenced by '{field}')"))
        })?;
        if let Some(RelationMeta { target, .. }) = &join.relation {
            self.check_column(target, field, column)?;
        }
        Ok(FieldRef::new(Some(&join.alias), column))
    }

    /// Resolve a field of a join condition; plain names refer to the join
    /// itself.
    ///
    /// # Errors
    ///
    /// As [`FieldResolver::resolve`].
    pub fn resolve_in(&self, join: &JoinSpec, field: &str) -> QueryResult<FieldRef> {
        if field.contains('.') {
            return self.resolve(field);
        }
        validate_field_path(field)?;
        if let Some(RelationMeta { target, .. }) = &join.relation {
            self.check_column(target, field, field)?;
        }
        Ok(FieldRef::new(Some(&join.alias), field))
    }

    /// Join by dotted path or alias
    #[must_use]
    pub fn join(&self, path: &str) -> Option<&'a JoinSpec> {
        self.joins
            .iter()
            .find(|join| join.field == path)
            .or_else(|| self.joins.iter().find(|join| join.alias == path))
    }

    #[must_use]
    pub fn table(&self) -> &'a str {
        self.table
    }
}
