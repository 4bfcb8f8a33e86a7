use axum::{
    body::Body as AxumBody,
    extract::{FromRequestParts, State},
    http::{HeaderMap, Request, header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

use crate::services::auth_service;
use crate::web::models::AuthenticatedUser;
use crate::web::{AppState, error::AppError};

/// Resolves the caller's identity when a token is presented. Requests without a token pass
/// through anonymously; a token that does not check out is rejected outright.
pub async fn identify(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    // Try to get token from Authorization header first, then fall back to cookie
    let token = header_token(req.headers()).or_else(|| jar.get("token").map(|c| c.value().to_string()));

    if let Some(token) = token {
        let authenticated_user =
            auth_service::authenticate_token(&state.db_pool, &token, &state.config.jwt_secret).await?;
        req.extensions_mut().insert(authenticated_user);
    }
    Ok(next.run(req).await)
}

/// Accepts both `Token <t>` and `Bearer <t>`.
fn header_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    (scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer")).then(|| token.to_string())
}

/// The caller, who must be authenticated.
#[derive(Debug, Clone)]
pub struct RequireUser(pub AuthenticatedUser);

/// The caller, if authenticated.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl<S: Send + Sync> FromRequestParts<S> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(RequireUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication credentials were not provided.".to_string()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<AuthenticatedUser>().cloned()))
    }
}
