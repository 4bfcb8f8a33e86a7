use axum::{Json, Router, extract::State, routing::get};
use std::sync::Arc;

use crate::db::{entities::tag, services::tag_service};
use crate::web::extract::PathParam;
use crate::web::{AppState, error::AppError};

async fn list_tags_handler(State(app_state): State<Arc<AppState>>) -> Result<Json<Vec<tag::Model>>, AppError> {
    let tags = tag_service::list_tags(&app_state.db_pool).await?;
    Ok(Json(tags))
}

async fn get_tag_handler(
    State(app_state): State<Arc<AppState>>,
    PathParam(tag_id): PathParam<i32>,
) -> Result<Json<tag::Model>, AppError> {
    tag_service::find_tag(&app_state.db_pool, tag_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No Tag matches the given query.".to_string()))
}

pub fn create_tag_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tags/", get(list_tags_handler))
        .route("/api/tags/{tag_id}/", get(get_tag_handler))
}
