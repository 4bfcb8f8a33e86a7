use axum::{
    Json, Router,
    extract::{OriginalUri, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::db::entities::recipe;
use crate::db::services::{
    recipe_query_service::{self, RecipeFilter},
    recipe_service,
    relation_service::{self, CartRelation, FavoriteRelation, PairRelation},
    shopping_list_service,
};
use crate::services::short_link;
use crate::web::error::{AppError, FieldErrors};
use crate::web::extract::{JsonBody, PathParam, QueryParams};
use crate::web::form::Form;
use crate::web::middleware::auth::{MaybeUser, RequireUser};
use crate::web::models::recipe_models::{RecipeShortView, RecipeView, ShortLinkResponse};
use crate::web::pagination::{PageParams, Paginated, fetch_page};
use crate::web::AppState;

pub fn create_recipe_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/recipes/", get(list_recipes).post(create_recipe))
        .route("/api/recipes/download_shopping_cart/", get(download_shopping_cart))
        .route(
            "/api/recipes/{recipe_id}/",
            get(get_recipe)
                .patch(update_recipe)
                .put(update_recipe)
                .delete(delete_recipe),
        )
        .route(
            "/api/recipes/{recipe_id}/favorite/",
            post(add_recipe_relation::<FavoriteRelation>).delete(remove_recipe_relation::<FavoriteRelation>),
        )
        .route(
            "/api/recipes/{recipe_id}/shopping_cart/",
            post(add_recipe_relation::<CartRelation>).delete(remove_recipe_relation::<CartRelation>),
        )
        .route("/api/recipes/{recipe_id}/get-link/", get(get_link))
}

#[derive(Debug, Default, Deserialize)]
pub struct RecipeListQuery {
    author: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    is_favorited: Option<String>,
    is_in_shopping_cart: Option<String>,
}

fn parse_flag(field: &str, value: Option<&str>, errors: &mut FieldErrors) -> Option<bool> {
    match value?.trim() {
        "1" | "true" | "True" => Some(true),
        "0" | "false" | "False" => Some(false),
        _ => {
            errors.add(field, "Select a valid choice.");
            None
        }
    }
}

impl RecipeListQuery {
    fn into_filter(self) -> Result<RecipeFilter, FieldErrors> {
        let mut errors = FieldErrors::new();
        let author = match self.author.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let parsed = raw.parse::<i32>().ok();
                if parsed.is_none() {
                    errors.add("author", "Enter a number.");
                }
                parsed
            }
        };
        let is_favorited = parse_flag("is_favorited", self.is_favorited.as_deref(), &mut errors);
        let is_in_shopping_cart =
            parse_flag("is_in_shopping_cart", self.is_in_shopping_cart.as_deref(), &mut errors);
        let tags = self
            .tags
            .into_iter()
            .map(|slug| slug.trim().to_string())
            .filter(|slug| !slug.is_empty())
            .collect();

        errors.into_result(RecipeFilter {
            author,
            tags,
            is_favorited,
            is_in_shopping_cart,
        })
    }
}

async fn render_recipe(app_state: &AppState, recipe: &recipe::Model, viewer_id: Option<i32>) -> Result<RecipeView, AppError> {
    let details =
        recipe_query_service::load_recipe_details(&app_state.db_pool, std::slice::from_ref(recipe), viewer_id).await?;
    RecipeView::render(recipe, &details, &app_state.config.public_url)
}

async fn list_recipes(
    State(app_state): State<Arc<AppState>>,
    MaybeUser(viewer): MaybeUser,
    OriginalUri(uri): OriginalUri,
    QueryParams(query): QueryParams<RecipeListQuery>,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Paginated<RecipeView>>, AppError> {
    let filter = query.into_filter()?;
    let request = page.resolve()?;
    let viewer_id = viewer.map(|user| user.id);
    let db = &app_state.db_pool;

    let Some(select) = recipe_query_service::filtered_recipes(db, &filter, viewer_id).await? else {
        return Ok(Json(Paginated::empty()));
    };
    let (recipes, count) = fetch_page(db, select, request).await?;
    let details = recipe_query_service::load_recipe_details(db, &recipes, viewer_id).await?;
    let results = RecipeView::render_all(&recipes, &details, &app_state.config.public_url)?;

    Ok(Json(Paginated::new(results, count, request, &app_state.config.public_url, &uri)))
}

async fn get_recipe(
    State(app_state): State<Arc<AppState>>,
    MaybeUser(viewer): MaybeUser,
    PathParam(recipe_id): PathParam<i32>,
) -> Result<Json<RecipeView>, AppError> {
    let recipe = recipe_service::get_recipe(&app_state.db_pool, recipe_id).await?;
    let view = render_recipe(&app_state, &recipe, viewer.map(|user| user.id)).await?;
    Ok(Json(view))
}

async fn create_recipe(
    State(app_state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    JsonBody(payload): JsonBody<Value>,
) -> Result<(StatusCode, Json<RecipeView>), AppError> {
    let form = Form::from_value(payload)?;
    let recipe = recipe_service::create_recipe(&app_state.db_pool, &app_state.media, user.id, &form).await?;
    let view = render_recipe(&app_state, &recipe, Some(user.id)).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn update_recipe(
    State(app_state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    PathParam(recipe_id): PathParam<i32>,
    JsonBody(payload): JsonBody<Value>,
) -> Result<Json<RecipeView>, AppError> {
    let form = Form::from_value(payload)?;
    let recipe =
        recipe_service::update_recipe(&app_state.db_pool, &app_state.media, recipe_id, user.id, &form).await?;
    let view = render_recipe(&app_state, &recipe, Some(user.id)).await?;
    Ok(Json(view))
}

async fn delete_recipe(
    State(app_state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    PathParam(recipe_id): PathParam<i32>,
) -> Result<StatusCode, AppError> {
    recipe_service::delete_recipe(&app_state.db_pool, &app_state.media, recipe_id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_recipe_relation<R: PairRelation + 'static>(
    State(app_state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    PathParam(recipe_id): PathParam<i32>,
) -> Result<(StatusCode, Json<RecipeShortView>), AppError> {
    let recipe = recipe_service::get_recipe(&app_state.db_pool, recipe_id).await?;
    relation_service::add::<R>(&app_state.db_pool, user.id, recipe.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(RecipeShortView::render(&recipe, &app_state.config.public_url)),
    ))
}

async fn remove_recipe_relation<R: PairRelation + 'static>(
    State(app_state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    PathParam(recipe_id): PathParam<i32>,
) -> Result<StatusCode, AppError> {
    let recipe = recipe_service::get_recipe(&app_state.db_pool, recipe_id).await?;
    relation_service::remove::<R>(&app_state.db_pool, user.id, recipe.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn download_shopping_cart(
    State(app_state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
) -> Result<impl IntoResponse, AppError> {
    let lines = shopping_list_service::shopping_list(&app_state.db_pool, user.id).await?;
    let body = shopping_list_service::render(&lines);
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"shopping_list.txt\""),
        ],
        body,
    ))
}

async fn get_link(
    State(app_state): State<Arc<AppState>>,
    PathParam(recipe_id): PathParam<i32>,
) -> Result<Json<ShortLinkResponse>, AppError> {
    let recipe = recipe_service::get_recipe(&app_state.db_pool, recipe_id).await?;
    Ok(Json(ShortLinkResponse {
        short_link: short_link::short_link_url(&app_state.config.public_url, recipe.id),
    }))
}
