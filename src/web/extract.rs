use axum::extract::{FromRequest, FromRequestParts};

use crate::web::error::AppError;

/// `axum::Json` whose rejection renders through [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// Query string extractor that accepts repeated keys (`?tags=a&tags=b`).
#[derive(FromRequestParts)]
#[from_request(via(axum_extra::extract::Query), rejection(AppError))]
pub struct QueryParams<T>(pub T);

/// Path extractor; a segment that does not parse means the resource does not exist.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct PathParam<T>(pub T);
