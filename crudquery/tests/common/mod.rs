use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use crudquery::config::{JoinOption, ParamOption, ParamType, QueryOptions, RouteOptions};
use crudquery::core::{ListResponse, QueryExecutor, SeaOrmExecutor, get_many};
use crudquery::database::{EntityMeta, RelationMeta, Schema};
use crudquery::filtering::CustomOperator;
use crudquery::{CrudAction, CrudQueryParams, QueryError, QuerySort, RouteConfig, RouteRegistry, SortOrder, parse_request};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr};
use utoipa::OpenApi;

#[allow(dead_code)]
pub const NO_PARAMS: [(&str, &str); 0] = [];

pub fn schema() -> Schema {
    Schema::new()
        .with_entity(
            EntityMeta::new("users", ["id", "name", "email", "age", "company_id", "deleted_at"])
                .primary_key(["id"])
                .relation("company", RelationMeta::belongs_to("companies", "company_id", "id")),
        )
        .with_entity(
            EntityMeta::new("companies", ["id", "name"])
                .primary_key(["id"])
                .relation("projects", RelationMeta::has_many("projects", "id", "company_id")),
        )
        .with_entity(EntityMeta::new("projects", ["id", "title", "company_id"]).primary_key(["id"]))
}

pub fn users_options() -> RouteOptions {
    let join = BTreeMap::from([
        ("company".to_string(), JoinOption::default()),
        ("company.projects".to_string(), JoinOption::default()),
    ]);
    RouteOptions::new("users")
        .query(QueryOptions {
            exclude: vec!["email".into()],
            join,
            sort: vec![QuerySort::new("id", SortOrder::Asc)],
            max_limit: Some(100),
            soft_delete: Some(true),
            ..QueryOptions::default()
        })
        .param("id", ParamOption::new("id", ParamType::Number).primary())
        .operator(CustomOperator::template("$lengthGt", false, "LENGTH({field}) > :{param}"))
        .operator(CustomOperator::template("$anyOf", true, "{field} IN (:...{param})"))
}

pub fn users_route() -> Arc<RouteConfig> {
    let mut registry = RouteRegistry::default().with_schema(schema());
    registry
        .register("users", users_options())
        .expect("users route should register")
}

// Compact logs for failing tests; ignored when a subscriber is already set
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_test_writer()
        .compact()
        .try_init();
}

#[allow(dead_code)]
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    init_tracing();
    let db = Database::connect("sqlite::memory:").await?;
    for statement in [
        "CREATE TABLE companies (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT NOT NULL, age INTEGER NOT NULL, company_id INTEGER NULL, deleted_at TEXT NULL)",
        "CREATE TABLE projects (id INTEGER PRIMARY KEY, title TEXT NOT NULL, company_id INTEGER NOT NULL)",
        "INSERT INTO companies (id, name) VALUES (1, 'Acme'), (2, 'Globex')",
        "INSERT INTO users (id, name, email, age, company_id, deleted_at) VALUES \
            (1, 'Alice', 'alice@example.com', 30, 1, NULL), \
            (2, 'Bob', 'bob@example.com', 17, 1, NULL), \
            (3, 'Carol', 'carol@example.com', 45, 2, NULL), \
            (4, 'Dave', 'dave@example.com', 25, 2, '2024-01-01'), \
            (5, 'Eve_x', 'eve@example.com', 22, NULL, NULL)",
        "INSERT INTO projects (id, title, company_id) VALUES (1, 'Rockets', 1), (2, 'Anvils', 1), (3, 'Portals', 2)",
    ] {
        db.execute_unprepared(statement).await?;
    }
    Ok(db)
}

#[derive(Clone)]
pub struct AppState {
    pub route: Arc<RouteConfig>,
    pub executor: SeaOrmExecutor,
}

#[utoipa::path(
    get,
    path = "/users",
    params(CrudQueryParams),
    responses(
        (status = 200, description = "Matching users; a page object when paginated"),
        (status = 400, description = "Invalid query")
    )
)]
async fn list_users(State(state): State<AppState>, RawQuery(query): RawQuery) -> Result<Response, QueryError> {
    let payload = parse_request(query.as_deref().unwrap_or(""), &state.route, NO_PARAMS, CrudAction::ReadAll)?;
    let response = get_many(&state.executor, &state.route, &payload).await?;
    let headers = match &response {
        ListResponse::Page(page) => payload.pagination.content_range(page.total, &state.route.name),
        ListResponse::All(_) => HeaderMap::new(),
    };
    Ok((headers, Json(response)).into_response())
}

#[allow(dead_code)]
#[derive(OpenApi)]
#[openapi(paths(list_users))]
pub struct ApiDoc;

async fn get_user(
    State(state): State<AppState>,
    Path(params): Path<Vec<(String, String)>>,
    RawQuery(query): RawQuery,
) -> Result<Response, QueryError> {
    let payload = parse_request(query.as_deref().unwrap_or(""), &state.route, params, CrudAction::ReadOne)?;
    match state.executor.fetch_one(&state.route, &payload).await? {
        Some(row) => Ok(Json(row).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

#[allow(dead_code)]
pub fn setup_test_app(db: &DatabaseConnection) -> Router {
    let state = AppState {
        route: users_route(),
        executor: SeaOrmExecutor::new(db.clone()),
    };
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user))
        .with_state(state)
}
