//! `ParsedRequestPayload` to sea-query statements.
//!
//! Emission needs relation key columns for every join, so payloads with joins
//! must be planned against a route that has entity metadata.

use sea_orm::{
    DatabaseBackend, Statement,
    sea_query::{Alias, Asterisk, Condition, Expr, JoinType, Query, SelectStatement},
};

use crate::errors::{QueryError, QueryResult};
use crate::filtering::conditions::CombinatorNode;
use crate::filtering::joined::FieldResolver;
use crate::filtering::operators::OperatorRegistry;
use crate::models::{JoinSpec, ParsedRequestPayload};

/// Unique parameter names for custom operator templates.
#[derive(Default)]
struct ParamNames {
    next: usize,
}

impl ParamNames {
    fn next(&mut self, field: &str) -> String {
        self.next += 1;
        format!("{}_{}", field.replace('.', "_"), self.next)
    }
}

struct Emitter<'a> {
    payload: &'a ParsedRequestPayload,
    registry: &'a OperatorRegistry,
    backend: DatabaseBackend,
    resolver: FieldResolver<'a>,
    params: ParamNames,
}

impl<'a> Emitter<'a> {
    fn new(payload: &'a ParsedRequestPayload, registry: &'a OperatorRegistry, backend: DatabaseBackend) -> Self {
        Self {
            payload,
            registry,
            backend,
            resolver: FieldResolver::new(&payload.table, &payload.join),
            params: ParamNames::default(),
        }
    }

    fn condition(&mut self, node: &CombinatorNode) -> QueryResult<Condition> {
        match node {
            CombinatorNode::Leaf(condition) => {
                let target = self.resolver.resolve(&condition.field)?;
                let param = self.params.next(&condition.field);
                let expr = self.registry.emit(condition, &target, &param, self.backend)?;
                Ok(Condition::all().add(expr))
            }
            CombinatorNode::And(children) => children
                .iter()
                .try_fold(Condition::all(), |group, child| Ok(group.add(self.condition(child)?))),
            CombinatorNode::Or(children) => children
                .iter()
                .try_fold(Condition::any(), |group, child| Ok(group.add(self.condition(child)?))),
        }
    }

    fn parent_alias(&self, join: &JoinSpec) -> QueryResult<&'a str> {
        let Some(parent) = join.parent_path() else {
            return Ok(&self.payload.table);
        };
        self.resolver
            .join(parent)
            .map(|spec| spec.alias.as_str())
            .ok_or_else(|| QueryError::invalid_join(&join.field, format!("parent relation '{parent}' is not joined")))
    }

    fn joins(&mut self, select: &mut SelectStatement, with_columns: bool) -> QueryResult<()> {
        let payload = self.payload;
        for join in &payload.join {
            let relation = join.relation.as_ref().ok_or_else(|| {
                QueryError::invalid_join(&join.field, "relation metadata is required to emit the join")
            })?;
            let parent = self.parent_alias(join)?;

            let mut on = Condition::all();
            for (from, to) in relation.from.iter().zip(&relation.to) {
                on = on.add(
                    Expr::col((Alias::new(parent), Alias::new(from)))
                        .equals((Alias::new(&join.alias), Alias::new(to))),
                );
            }
            for condition in &join.on {
                let target = self.resolver.resolve_in(join, &condition.field)?;
                let param = self.params.next(&format!("{}.{}", join.alias, condition.field));
                on = on.add(self.registry.emit(condition, &target, &param, self.backend)?);
            }

            let kind = if join.required {
                JoinType::InnerJoin
            } else {
                JoinType::LeftJoin
            };
            select.join_as(kind, Alias::new(&relation.target), Alias::new(&join.alias), on);

            match &join.select {
                _ if !with_columns => {}
                None => {
                    select.column((Alias::new(&join.alias), Asterisk));
                }
                Some(columns) => {
                    for column in columns {
                        select.expr_as(
                            Expr::col((Alias::new(&join.alias), Alias::new(column))),
                            Alias::new(format!("{}.{column}", join.field)),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn filtered(&mut self, select: &mut SelectStatement, with_columns: bool) -> QueryResult<()> {
        let payload = self.payload;
        self.joins(select, with_columns)?;
        if !payload.search.is_empty() {
            let condition = self.condition(&payload.search)?;
            select.cond_where(condition);
        }
        if let (Some(column), false) = (&payload.soft_delete_column, payload.include_deleted) {
            select.and_where(Expr::col((Alias::new(&payload.table), Alias::new(column))).is_null());
        }
        Ok(())
    }
}

/// Build the `SELECT` for a planned request: columns, joins, `WHERE`,
/// `ORDER BY`, `LIMIT` and `OFFSET`.
///
/// # Errors
///
/// [`QueryError::InvalidJoin`] for a join without relation metadata; field
/// and operator errors for payloads that were not produced by the planner.
pub fn build_select(
    payload: &ParsedRequestPayload,
    registry: &OperatorRegistry,
    backend: DatabaseBackend,
) -> QueryResult<SelectStatement> {
    let table = Alias::new(&payload.table);
    let mut select = Query::select();
    select.from(table.clone());

    if payload.fields.is_empty() {
        select.column((table.clone(), Asterisk));
    } else {
        for field in &payload.fields {
            select.column((table.clone(), Alias::new(field)));
        }
    }

    let mut emitter = Emitter::new(payload, registry, backend);
    emitter.filtered(&mut select, true)?;

    for sort in &payload.sort {
        let target = emitter.resolver.resolve(&sort.field)?;
        select.order_by_expr(target.expr().into(), sort.order.into());
    }
    if let Some(limit) = payload.pagination.limit {
        select.limit(limit);
    }
    if let Some(offset) = payload.pagination.offset {
        select.offset(offset);
    }
    Ok(select)
}

/// Build `SELECT COUNT(*)` over the same joins and conditions, without
/// ordering or pagination.
///
/// # Errors
///
/// As [`build_select`].
pub fn build_count(
    payload: &ParsedRequestPayload,
    registry: &OperatorRegistry,
    backend: DatabaseBackend,
) -> QueryResult<SelectStatement> {
    let mut select = Query::select();
    select
        .from(Alias::new(&payload.table))
        .expr_as(Expr::cust("COUNT(*)"), Alias::new("total"));

    Emitter::new(payload, registry, backend).filtered(&mut select, false)?;
    Ok(select)
}

/// [`build_select`] rendered for `backend`, ready to execute.
///
/// # Errors
///
/// As [`build_select`].
pub fn select_statement(
    payload: &ParsedRequestPayload,
    registry: &OperatorRegistry,
    backend: DatabaseBackend,
) -> QueryResult<Statement> {
    Ok(backend.build(&build_select(payload, registry, backend)?))
}
