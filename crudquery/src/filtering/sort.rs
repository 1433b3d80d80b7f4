use super::joined::FieldResolver;
use crate::errors::{QueryError, QueryResult};
use crate::models::{QuerySort, SortSpec};

/// Validate the request's sort, falling back to the route default when the
/// request has none. Appearance order is kept.
///
/// Every field is checked for injection patterns and identifier syntax and
/// must resolve against the base table or a planned join.
///
/// # Errors
///
/// Returns [`QueryError::Validation`] for the first field that fails; an
/// unjoined relation in a sort field is reported as a validation error too.
pub fn plan_sort(
    requested: &[QuerySort],
    defaults: &[QuerySort],
    resolver: &FieldResolver<'_>,
) -> QueryResult<Vec<SortSpec>> {
    let source = if requested.is_empty() { defaults } else { requested };

    source
        .iter()
        .map(|sort| {
            resolver.resolve(&sort.field).map_err(|err| match err {
                QueryError::InvalidJoin { reason, .. } => QueryError::validation(&sort.field, reason),
                other => other,
            })?;
            Ok(SortSpec {
                field: sort.field.clone(),
                order: sort.order,
            })
        })
        .collect()
}
