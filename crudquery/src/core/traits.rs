use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, JsonValue};
use serde::Serialize;

use crate::database::select::{build_count, build_select};
use crate::errors::{QueryError, QueryResult};
use crate::filtering::pagination::GetManyResponse;
use crate::models::ParsedRequestPayload;
use crate::routes::RouteConfig;

/// Runs compiled requests. The compiler never calls this itself; handlers
/// pass the payload once planning succeeded.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    type Row: Send;

    /// Rows matching the payload, honouring sort and pagination
    async fn fetch_many(&self, route: &RouteConfig, payload: &ParsedRequestPayload) -> QueryResult<Vec<Self::Row>>;

    /// Rows matching the payload's conditions, ignoring pagination
    async fn count(&self, route: &RouteConfig, payload: &ParsedRequestPayload) -> QueryResult<u64>;

    async fn fetch_one(
        &self,
        route: &RouteConfig,
        payload: &ParsedRequestPayload,
    ) -> QueryResult<Option<Self::Row>> {
        Ok(self.fetch_many(route, payload).await?.into_iter().next())
    }
}

/// Result of a list request: a page when the payload paginates, otherwise
/// the plain rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Page(GetManyResponse<T>),
    All(Vec<T>),
}

/// Fetch a list, counting the total only when the response is a page.
///
/// # Errors
///
/// Whatever the executor returns.
pub async fn get_many<E>(executor: &E, route: &RouteConfig, payload: &ParsedRequestPayload) -> QueryResult<ListResponse<E::Row>>
where
    E: QueryExecutor + ?Sized,
{
    let rows = executor.fetch_many(route, payload).await?;
    if !payload.pagination.paginate {
        return Ok(ListResponse::All(rows));
    }
    let total = executor.count(route, payload).await?;
    Ok(ListResponse::Page(GetManyResponse::new(rows, total, &payload.pagination)))
}

/// Executes payloads on a sea-orm connection, returning rows as JSON objects.
#[derive(Debug, Clone)]
pub struct SeaOrmExecutor {
    db: DatabaseConnection,
}

impl SeaOrmExecutor {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[derive(FromQueryResult)]
struct CountRow {
    total: i64,
}

#[async_trait]
impl QueryExecutor for SeaOrmExecutor {
    type Row = JsonValue;

    async fn fetch_many(&self, route: &RouteConfig, payload: &ParsedRequestPayload) -> QueryResult<Vec<JsonValue>> {
        let backend = self.db.get_database_backend();
        let statement = backend.build(&build_select(payload, &route.operators, backend)?);
        tracing::debug!(route = %route.name, sql = %statement, "Executing select");
        Ok(JsonValue::find_by_statement(statement).all(&self.db).await?)
    }

    async fn count(&self, route: &RouteConfig, payload: &ParsedRequestPayload) -> QueryResult<u64> {
        let backend = self.db.get_database_backend();
        let statement = backend.build(&build_count(payload, &route.operators, backend)?);
        let row = CountRow::find_by_statement(statement)
            .one(&self.db)
            .await?
            .ok_or_else(|| QueryError::internal("Count failed", Some("count query returned no rows".to_string())))?;
        Ok(u64::try_from(row.total).unwrap_or(0))
    }
}
