// Request planning against a route with entity metadata

use crudquery::config::{DefaultFilter, QueryOptions, RouteOptions};
use crudquery::filtering::{CombinatorNode, Condition, CustomOperator, DEFAULT_PAGE_LIMIT};
use crudquery::{CrudAction, QueryError, RouteRegistry, SortOrder, parse_request};
use serde_json::json;

mod common;
use common::{NO_PARAMS, schema, users_route};

#[test]
fn test_nested_join_requires_parent() {
    let route = users_route();
    let err = parse_request("join=company.projects", &route, NO_PARAMS, CrudAction::ReadAll).unwrap_err();
    assert!(matches!(err, QueryError::InvalidJoin { ref path, .. } if path == "company.projects"));
    assert!(err.is_client_error());
}

#[test]
fn test_nested_join_conditions_resolve() {
    let route = users_route();
    let payload = parse_request(
        "join=company&join=company.projects||title&filter=company.projects.title||$starts||Ro",
        &route,
        NO_PARAMS,
        CrudAction::ReadAll,
    )
    .unwrap();
    let aliases: Vec<&str> = payload.join.iter().map(|join| join.alias.as_str()).collect();
    assert_eq!(aliases, vec!["company", "projects"]);
    assert_eq!(payload.join[1].select, Some(vec!["title".to_string(), "id".to_string()]));

    let err = parse_request(
        "join=company&join=company.projects&filter=company.projects.budget||$gt||1",
        &route,
        NO_PARAMS,
        CrudAction::ReadAll,
    )
    .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
}

#[test]
fn test_sort_injection_rejected() {
    let route = users_route();
    let query = format!(
        "sort={},ASC",
        url::form_urlencoded::byte_serialize(b" ASC; SELECT CAST( version() AS INTEGER); --").collect::<String>()
    );
    let err = parse_request(&query, &route, NO_PARAMS, CrudAction::ReadAll).unwrap_err();
    let QueryError::Validation(inner) = err else {
        panic!("expected validation error");
    };
    assert_eq!(inner.message, "SQL injection detected");
}

#[test]
fn test_unknown_sort_column_rejected() {
    let route = users_route();
    let err = parse_request("sort=shoe_size,ASC", &route, NO_PARAMS, CrudAction::ReadAll).unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));

    let payload = parse_request("", &route, NO_PARAMS, CrudAction::ReadAll).unwrap();
    assert_eq!(payload.sort[0].field, "id");
    assert_eq!(payload.sort[0].order, SortOrder::Asc);
}

#[test]
fn test_limit_clamped_and_always_paginate() {
    let route = users_route();
    let payload = parse_request("limit=500", &route, NO_PARAMS, CrudAction::ReadAll).unwrap();
    assert_eq!(payload.pagination.limit, Some(100));

    let mut registry = RouteRegistry::default().with_schema(schema());
    let paged = registry
        .register(
            "paged",
            RouteOptions::new("users").query(QueryOptions {
                always_paginate: Some(true),
                ..QueryOptions::default()
            }),
        )
        .unwrap();
    let payload = parse_request("", &paged, NO_PARAMS, CrudAction::ReadAll).unwrap();
    assert_eq!(payload.pagination.limit, Some(DEFAULT_PAGE_LIMIT));
    assert!(payload.pagination.paginate);
}

#[test]
fn test_excluded_columns_never_selected() {
    let route = users_route();
    let payload = parse_request("fields=name,email", &route, NO_PARAMS, CrudAction::ReadAll).unwrap();
    assert_eq!(payload.fields, vec!["name".to_string(), "id".to_string()]);

    let payload = parse_request("", &route, NO_PARAMS, CrudAction::ReadAll).unwrap();
    assert!(!payload.fields.contains(&"email".to_string()));
}

#[test]
fn test_path_param_and_default_filter_merged() {
    let mut registry = RouteRegistry::default().with_schema(schema());
    let options = common::users_options().query(QueryOptions {
        filter: Some(DefaultFilter::Search(json!({"age": {"$gte": 18}}))),
        ..QueryOptions::default()
    });
    let route = registry.register("adults", options).unwrap();
    let payload = parse_request("filter=name||$eq||Alice", &route, [("id", "1")], CrudAction::ReadOne).unwrap();
    assert_eq!(
        payload.search,
        CombinatorNode::And(vec![
            CombinatorNode::Leaf(Condition::new("id", "$eq", 1)),
            CombinatorNode::Leaf(Condition::new("age", "$gte", 18)),
            CombinatorNode::Leaf(Condition::new("name", "$eq", "Alice")),
        ])
    );
}

#[test]
fn test_collision_fails_at_registration() {
    let mut registry = RouteRegistry::default();
    let err = registry
        .register(
            "users",
            RouteOptions::new("users").operator(CustomOperator::template("$eq", false, "{field} = :{param}")),
        )
        .unwrap_err();
    assert!(matches!(err, QueryError::OperatorCollision { .. }));
}

#[test]
fn test_search_payload_round_trips_as_json() {
    let route = users_route();
    let payload = parse_request(r#"s={"$or":[{"age":{"$lt":18}},{"name":"Carol"}]}"#, &route, NO_PARAMS, CrudAction::ReadAll)
        .unwrap();
    assert_eq!(
        payload.search_json(),
        json!({"$or": [{"age": {"$lt": 18}}, {"name": {"$eq": "Carol"}}]})
    );
}
