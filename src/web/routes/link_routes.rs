use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;
use tracing::debug;

use crate::db::services::recipe_service;
use crate::services::short_link;
use crate::web::extract::PathParam;
use crate::web::{AppState, error::AppError};

/// Resolves a short link to the recipe's page on the frontend.
async fn follow_short_link(
    State(app_state): State<Arc<AppState>>,
    PathParam(code): PathParam<String>,
) -> Result<impl IntoResponse, AppError> {
    let recipe_id = short_link::decode(&code).ok_or_else(|| {
        debug!(code = %code, "Malformed short link code.");
        AppError::NotFound("Not found.".to_string())
    })?;
    let recipe = recipe_service::get_recipe(&app_state.db_pool, recipe_id).await?;
    let location = short_link::recipe_page_url(&app_state.config.frontend_url, recipe.id);
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]))
}

pub fn create_link_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/s/{code}", get(follow_short_link))
        .route("/s/{code}/", get(follow_short_link))
}
