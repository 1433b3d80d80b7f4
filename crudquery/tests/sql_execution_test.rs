// Planned requests executed against in-memory SQLite

use crudquery::core::{ListResponse, QueryExecutor, SeaOrmExecutor, get_many};
use crudquery::database::build_select;
use crudquery::{CrudAction, QueryError, parse_request};
use sea_orm::{DatabaseBackend, JsonValue};

mod common;
use common::{NO_PARAMS, setup_test_db, users_route};

async fn names(query: &str) -> Vec<String> {
    let db = setup_test_db().await.expect("Failed to setup test database");
    let route = users_route();
    let payload = parse_request(query, &route, NO_PARAMS, CrudAction::ReadAll).unwrap();
    let rows = SeaOrmExecutor::new(db).fetch_many(&route, &payload).await.unwrap();
    rows.iter()
        .map(|row| row["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_filter_and_sort() {
    assert_eq!(names("filter=age||$gte||18&sort=age,DESC").await, vec!["Carol", "Alice", "Eve_x"]);
}

#[tokio::test]
async fn test_or_group() {
    assert_eq!(names("filter=age||$lt||18&or=name||$eq||Carol").await, vec!["Bob", "Carol"]);
}

#[tokio::test]
async fn test_soft_deleted_rows_hidden_unless_requested() {
    assert!(!names("").await.contains(&"Dave".to_string()));
    assert!(names("include_deleted=1").await.contains(&"Dave".to_string()));
}

#[tokio::test]
async fn test_like_wildcards_are_literal() {
    assert_eq!(names("filter=name||$cont||_").await, vec!["Eve_x"]);
    assert_eq!(names("filter=name||$contL||ALI").await, vec!["Alice"]);
    assert_eq!(names("filter=name||$starts||%25").await, Vec::<String>::new());
}

#[tokio::test]
async fn test_null_equality_never_matches() {
    assert!(names(r#"s={"company_id":null}"#).await.is_empty());
    assert_eq!(names(r#"s={"company_id":{"$isnull":true}}"#).await, vec!["Eve_x"]);
}

#[tokio::test]
async fn test_in_between_and_custom_operators() {
    assert_eq!(names("filter=id||$in||1,3").await, vec!["Alice", "Carol"]);
    assert_eq!(names("filter=age||$between||20,30").await, vec!["Alice", "Eve_x"]);
    assert_eq!(names("filter=name||$lengthGt||4").await, vec!["Alice", "Carol", "Eve_x"]);
    assert_eq!(names("filter=id||$anyOf||2,5").await, vec!["Bob", "Eve_x"]);
}

#[tokio::test]
async fn test_join_columns_and_filters() {
    let db = setup_test_db().await.expect("Failed to setup test database");
    let route = users_route();
    let payload = parse_request(
        "join=company||name&filter=company.name||$eq||Acme",
        &route,
        NO_PARAMS,
        CrudAction::ReadAll,
    )
    .unwrap();
    let rows = SeaOrmExecutor::new(db).fetch_many(&route, &payload).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["company.name"], "Acme");
    assert!(rows[0].get("email").is_none());
}

#[tokio::test]
async fn test_paginated_list() {
    let db = setup_test_db().await.expect("Failed to setup test database");
    let route = users_route();
    let payload = parse_request("limit=2&page=2", &route, NO_PARAMS, CrudAction::ReadAll).unwrap();
    let response = get_many(&SeaOrmExecutor::new(db), &route, &payload).await.unwrap();
    let ListResponse::Page(page) = response else {
        panic!("expected a page");
    };
    assert_eq!(page.total, 4);
    assert_eq!(page.page, 2);
    assert_eq!(page.page_count, 2);
    let ids: Vec<i64> = page.data.iter().map(|row: &JsonValue| row["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![3, 5]);
}

#[tokio::test]
async fn test_join_without_metadata_cannot_be_emitted() {
    let route = users_route();
    let mut payload = parse_request("join=company", &route, NO_PARAMS, CrudAction::ReadAll).unwrap();
    payload.join[0].relation = None;
    let err = build_select(&payload, &route.operators, DatabaseBackend::Sqlite).unwrap_err();
    assert!(matches!(err, QueryError::InvalidJoin { .. }));
}
