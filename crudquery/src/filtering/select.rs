//! Field selection.

use crate::config::QueryOptions;
use crate::database::metadata::EntityMeta;

/// `persist`, then `columns`, then `primary_keys`, without duplicates.
pub(crate) fn merge_columns(persist: &[String], columns: Vec<String>, primary_keys: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(persist.len() + columns.len() + primary_keys.len());
    for column in persist.iter().cloned().chain(columns).chain(primary_keys.iter().cloned()) {
        if !merged.contains(&column) {
            merged.push(column);
        }
    }
    merged
}

/// Base-table columns to select for a request.
///
/// Requested fields are intersected with what the route allows; unknown or
/// excluded fields are dropped silently. Primary keys and `persist` columns
/// are always added. An empty result selects every column, which happens
/// only when neither the request, the route nor the metadata narrows it.
#[must_use]
pub fn plan_select(
    requested: &[String],
    options: &QueryOptions,
    primary_keys: &[String],
    entity: Option<&EntityMeta>,
) -> Vec<String> {
    let not_excluded = |column: &String| !options.exclude.contains(column);

    let allowed: Option<Vec<String>> = match (entity, &options.allow) {
        (Some(entity), allow) => Some(
            entity
                .columns
                .iter()
                .filter(|column| allow.as_ref().is_none_or(|allow| allow.contains(column)))
                .cloned()
                .collect(),
        ),
        (None, Some(allow)) => Some(allow.clone()),
        (None, None) => None,
    }
    .map(|columns| columns.into_iter().filter(not_excluded).collect());

    let columns: Vec<String> = match (allowed, requested.is_empty()) {
        (Some(allowed), false) => allowed.into_iter().filter(|c| requested.contains(c)).collect(),
        (Some(allowed), true) => allowed,
        (None, false) => requested.iter().filter(|c| not_excluded(c)).cloned().collect(),
        (None, true) => return Vec::new(),
    };
    merge_columns(&options.persist, columns, primary_keys)
}
