//! Page-number pagination: `?page=<n>&limit=<size>` in, `{count, next, previous, results}` out.

use axum::http::Uri;
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait, Select};
use serde::{Deserialize, Serialize};

use crate::web::error::AppError;

pub const DEFAULT_PAGE_SIZE: u64 = 6;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based.
    pub page: u64,
    pub limit: u64,
}

impl PageParams {
    pub fn resolve(&self) -> Result<PageRequest, AppError> {
        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(invalid_page());
        }
        let limit = match self.limit {
            Some(0) | None => DEFAULT_PAGE_SIZE,
            Some(limit) => limit.min(MAX_PAGE_SIZE),
        };
        Ok(PageRequest { page, limit })
    }
}

fn invalid_page() -> AppError {
    AppError::NotFound("Invalid page.".to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn empty() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: Vec::new(),
        }
    }

    /// Wraps one page of results, linking the neighbouring pages of the same request.
    pub fn new(results: Vec<T>, count: u64, request: PageRequest, public_url: &str, uri: &Uri) -> Self {
        let next = request
            .page
            .checked_mul(request.limit)
            .is_some_and(|seen| seen < count)
            .then(|| page_link(public_url, uri, request.page + 1));
        let previous = (request.page > 1).then(|| page_link(public_url, uri, request.page - 1));
        Self {
            count,
            next,
            previous,
            results,
        }
    }
}

/// The request URL with its `page` parameter replaced. Page 1 is written without one.
fn page_link(public_url: &str, uri: &Uri, page: u64) -> String {
    let mut params: Vec<String> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty() && !pair.starts_with("page=") && *pair != "page")
        .map(str::to_string)
        .collect();
    if page > 1 {
        params.push(format!("page={page}"));
    }

    let base = format!("{}{}", public_url.trim_end_matches('/'), uri.path());
    if params.is_empty() {
        base
    } else {
        format!("{base}?{}", params.join("&"))
    }
}

/// Counts the query's rows and fetches the requested page. Pages past the end are a 404,
/// except the first page of an empty result.
pub async fn fetch_page<C, E>(db: &C, query: Select<E>, request: PageRequest) -> Result<(Vec<E::Model>, u64), AppError>
where
    C: ConnectionTrait,
    E: EntityTrait,
    E::Model: Send + Sync + 'static,
{
    let paginator = query.paginate(db, request.limit);
    let count = paginator.num_items().await?;
    let skipped = (request.page - 1).checked_mul(request.limit);
    if request.page > 1 && skipped.is_none_or(|skipped| skipped >= count) {
        return Err(invalid_page());
    }
    let items = paginator.fetch_page(request.page - 1).await?;
    Ok((items, count))
}
