// Query string codec: decoding, encoding and the round-trip law

use crudquery::filtering::{
    CombinatorNode, Condition, FilterValue, OperatorRegistry, ParserOptions, QueryParser, RequestQueryBuilder,
    compile_search, decode, encode,
};
use crudquery::{CrudRequestQuery, QueryError, QueryJoin, QuerySort, SortOrder};
use serde_json::json;

mod common;

fn sample_request() -> CrudRequestQuery {
    CrudRequestQuery {
        fields: vec!["id".into(), "name".into()],
        search: None,
        filter: vec![
            Condition::new("name", "$cont", "john, jr"),
            Condition::new("age", "$between", FilterValue::list([18_i64, 30])),
            Condition::new("code", "$in", FilterValue::list(["007", "42", "a,b"])),
            Condition::unary("deleted_at", "$isnull"),
        ],
        or: vec![Condition::new("role", "$eqL", "Admin")],
        join: vec![
            QueryJoin::new("company").select(["name"]),
            QueryJoin::new("company.projects").on(Condition::new("title", "$starts", "R")),
        ],
        sort: vec![
            QuerySort::new("name", SortOrder::Asc),
            QuerySort::new("id", SortOrder::Desc),
        ],
        limit: Some(10),
        offset: None,
        page: Some(2),
        cache: Some(0),
        include_deleted: None,
    }
}

#[test]
fn test_round_trip_preserves_order_and_values() {
    let options = ParserOptions::default();
    let request = sample_request();
    let decoded = decode(&encode(&request, &options), &options).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn test_round_trip_with_search_object() {
    let options = ParserOptions::default();
    let request = CrudRequestQuery {
        search: Some(json!({"$or": [{"a": 1}, {"b": {"$contL": "x|y"}}], "c": [1, 2]})),
        ..CrudRequestQuery::default()
    };
    assert_eq!(decode(&encode(&request, &options), &options).unwrap(), request);
}

#[test]
fn test_round_trip_with_custom_delimiters() {
    let options = ParserOptions {
        delim: "::".into(),
        delim_list: ';',
        ..ParserOptions::default()
    };
    let request = sample_request();
    let encoded = encode(&request, &options);
    assert!(encoded.contains("name%3A%3A%24cont"));
    assert_eq!(decode(&encoded, &options).unwrap(), request);
}

#[test]
fn test_repeated_keys_accumulate() {
    let request = decode(
        "filter=a||$eq||1&filter[]=b||$eq||2&filter[3]=c||$eq||3&sort=a,ASC&sort=b,DESC",
        &ParserOptions::default(),
    )
    .unwrap();
    let fields: Vec<&str> = request.filter.iter().map(|c| c.field.as_str()).collect();
    assert_eq!(fields, vec!["a", "b", "c"]);
    assert_eq!(request.sort.len(), 2);
}

#[test]
fn test_malformed_token_fails_whole_decode() {
    let options = ParserOptions::default();
    for query in [
        "filter=name||$eq||bob&filter=age||$bogus||3",
        "filter=id||$in||",
        "filter=id||$between||1,2,3",
        "sort=name",
        "sort=name,SIDEWAYS",
        "limit=-1",
        "s=[1,2]",
    ] {
        let err = decode(query, &options).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)), "{query}: {err}");
    }

    let QueryError::Validation(inner) = decode("filter=age||$bogus||3", &options).unwrap_err() else {
        panic!("expected validation error");
    };
    assert_eq!(inner.field, "filter=age||$bogus||3");
}

#[test]
fn test_aliases_and_builder() {
    let options = ParserOptions::default();
    let request = decode("select=id&per_page=5&search={\"id\":1}", &options).unwrap();
    assert_eq!(request.fields, vec!["id".to_string()]);
    assert_eq!(request.limit, Some(5));
    assert!(request.search.is_some());

    let built = RequestQueryBuilder::new()
        .filter(Condition::new("name", "$starts", "Al"))
        .or(Condition::new("age", "$gt", 40))
        .join(QueryJoin::new("company"))
        .page(3)
        .reset_cache()
        .build();
    let decoded = decode(&built, &options).unwrap();
    assert_eq!(decoded.or, vec![Condition::new("age", "$gt", 40)]);
    assert_eq!(decoded.page, Some(3));
    assert_eq!(decoded.cache, Some(0));
}

#[test]
fn test_custom_operators_decode_only_for_their_route() {
    let route = common::users_route();
    let options = ParserOptions::default();
    let query = "filter=name||$lengthGt||3";

    let request = QueryParser::new(&options, &route.operators).decode(query).unwrap();
    assert_eq!(request.filter[0].operator, "$lengthGt");
    assert!(decode(query, &options).is_err());
}

#[test]
fn test_search_object_grammar() {
    let registry = OperatorRegistry::builtin();
    let leaf = |field: &str, value: i64| CombinatorNode::Leaf(Condition::new(field, "$eq", value));

    assert_eq!(
        compile_search(&json!({"$and": [{"a": 1}, {"b": 2}]}), &registry).unwrap(),
        CombinatorNode::And(vec![leaf("a", 1), leaf("b", 2)])
    );
    assert_eq!(
        compile_search(&json!({"$or": [{"a": 1}, {"b": 2}], "c": 3}), &registry).unwrap(),
        CombinatorNode::And(vec![CombinatorNode::Or(vec![leaf("a", 1), leaf("b", 2)]), leaf("c", 3)])
    );
    assert_eq!(
        compile_search(&json!({"id": [1, 2]}), &registry).unwrap(),
        compile_search(&json!({"id": {"$in": [1, 2]}}), &registry).unwrap()
    );
    for bad in [json!({"id": {"$in": []}}), json!({"id": {"$between": [1]}}), json!({"id": {"$notin": []}})] {
        assert!(matches!(compile_search(&bad, &registry), Err(QueryError::Validation(_))), "{bad}");
    }
}
