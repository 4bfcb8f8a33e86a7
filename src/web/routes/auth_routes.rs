use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::Value;
use std::sync::Arc;

use crate::services::auth_service;
use crate::web::extract::JsonBody;
use crate::web::form::Form;
use crate::web::middleware::auth::RequireUser;
use crate::web::models::TokenResponse;
use crate::web::{AppState, error::AppError};

async fn login_handler(
    State(app_state): State<Arc<AppState>>,
    jar: CookieJar,
    JsonBody(payload): JsonBody<Value>,
) -> Result<impl IntoResponse, AppError> {
    let form = Form::from_value(payload)?;
    let token = auth_service::login(&app_state.db_pool, &form, &app_state.config).await?;

    let auth_cookie = Cookie::build(("token", token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(app_state.config.public_url.starts_with("https://"))
        .build();

    Ok((jar.add(auth_cookie), Json(TokenResponse { auth_token: token })))
}

async fn logout_handler(
    State(app_state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    auth_service::logout(&app_state.db_pool, user.id).await?;
    Ok((jar.remove(Cookie::build("token").path("/")), StatusCode::NO_CONTENT))
}

pub fn create_auth_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/token/login/", post(login_handler))
        .route("/api/auth/token/logout/", post(logout_handler))
}
