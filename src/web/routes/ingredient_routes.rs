use axum::{Json, Router, extract::State, routing::get};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{entities::ingredient, services::ingredient_service};
use crate::web::extract::{PathParam, QueryParams};
use crate::web::{AppState, error::AppError};

#[derive(Debug, Default, Deserialize)]
pub struct IngredientSearchQuery {
    name: Option<String>,
}

async fn search_ingredients_handler(
    State(app_state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<IngredientSearchQuery>,
) -> Result<Json<Vec<ingredient::Model>>, AppError> {
    let ingredients = ingredient_service::search_ingredients(&app_state.db_pool, query.name.as_deref()).await?;
    Ok(Json(ingredients))
}

async fn get_ingredient_handler(
    State(app_state): State<Arc<AppState>>,
    PathParam(ingredient_id): PathParam<i32>,
) -> Result<Json<ingredient::Model>, AppError> {
    ingredient_service::find_ingredient(&app_state.db_pool, ingredient_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No Ingredient matches the given query.".to_string()))
}

pub fn create_ingredient_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ingredients/", get(search_ingredients_handler))
        .route("/api/ingredients/{ingredient_id}/", get(get_ingredient_handler))
}
