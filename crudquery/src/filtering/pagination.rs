use axum::http::header::HeaderMap;
use serde::Serialize;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;

use crate::config::QueryOptions;
use crate::models::CrudRequestQuery;

/// Page size used when a route always paginates but sets no limit
pub const DEFAULT_PAGE_LIMIT: u64 = 10;

/// Resolved `LIMIT` / `OFFSET` for a list request.
#[skip_serializing_none]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PaginationSpec {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub page: Option<u64>,
    /// Whether the response is a page ([`GetManyResponse`]) or a plain list
    pub paginate: bool,
}

impl PaginationSpec {
    /// Resolve pagination for a request:
    ///
    /// - the limit is the request's, else the route's, capped at `max_limit`;
    ///   with neither it is `max_limit`, and `always_paginate` falls back to
    ///   [`DEFAULT_PAGE_LIMIT`]
    /// - `page` wins over `offset`: `offset = (page - 1) * limit`
    /// - `0` for `limit` or `page` counts as not given
    #[must_use]
    pub fn resolve(query: &CrudRequestQuery, options: &QueryOptions) -> Self {
        let requested = query.limit.filter(|limit| *limit > 0);
        let page = query.page.filter(|page| *page > 0);

        let capped = |limit: u64| match options.max_limit {
            Some(max) if limit > max => {
                tracing::warn!(requested = limit, max_limit = max, "Limit clamped to route maximum");
                max
            }
            _ => limit,
        };
        let always = options.always_paginate();
        let limit = requested
            .or(options.limit.filter(|limit| *limit > 0))
            .map(capped)
            .or(options.max_limit)
            .or(always.then_some(DEFAULT_PAGE_LIMIT))
            .map(|limit| limit.max(1));

        let offset = match (page, limit) {
            (Some(page), Some(limit)) => Some((page - 1).saturating_mul(limit)),
            _ => query.offset,
        };
        let paginate = always || ((page.is_some() || query.offset.is_some()) && limit.is_some());

        Self {
            limit,
            offset,
            page,
            paginate,
        }
    }

    /// Content-Range header for the page, e.g. `users 0-9/100`.
    ///
    /// The resource name is stripped of characters that are not valid in a
    /// header value.
    #[must_use]
    pub fn content_range(&self, total: u64, resource: &str) -> HeaderMap {
        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(total).max(1);
        let last = (offset.saturating_add(limit) - 1).min(total.saturating_sub(1));

        let safe_name: String = resource
            .chars()
            .filter(|c| c.is_ascii() && !c.is_ascii_control())
            .collect();
        let mut headers = HeaderMap::new();
        if let Ok(value) = format!("{safe_name} {offset}-{last}/{total}").parse() {
            headers.insert("Content-Range", value);
        }
        headers
    }
}

/// One page of a list result.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GetManyResponse<T> {
    pub data: Vec<T>,
    /// Rows in this page
    pub count: u64,
    /// Rows matching the query
    pub total: u64,
    /// 1-based page number
    pub page: u64,
    pub page_count: u64,
}

impl<T> GetManyResponse<T> {
    #[must_use]
    pub fn new(data: Vec<T>, total: u64, pagination: &PaginationSpec) -> Self {
        let offset = pagination.offset.unwrap_or(0);
        let (page, page_count) = match pagination.limit {
            Some(limit) if limit > 0 => (offset / limit + 1, total.div_ceil(limit).max(1)),
            _ => (1, 1),
        };
        Self {
            count: data.len() as u64,
            data,
            total,
            page,
            page_count,
        }
    }
}
