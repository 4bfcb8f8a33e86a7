use axum::{
    Json, Router,
    extract::{OriginalUri, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::db::entities::user;
use crate::db::services::{
    recipe_query_service,
    relation_service::{self, SubscriptionRelation},
    user_service,
};
use crate::services::media_storage::media_url;
use crate::web::extract::{JsonBody, PathParam, QueryParams};
use crate::web::form::Form;
use crate::web::middleware::auth::{MaybeUser, RequireUser};
use crate::web::models::recipe_models::RecipeShortView;
use crate::web::models::user_models::{AvatarResponse, RegisteredUserView, SubscriptionView, UserView};
use crate::web::pagination::{PageParams, Paginated, fetch_page};
use crate::web::{AppState, error::AppError};

#[derive(Debug, Default, Deserialize)]
pub struct RecipesLimitQuery {
    recipes_limit: Option<usize>,
}

// --- Rendering helpers ---

async fn render_users(
    app_state: &AppState,
    users: &[user::Model],
    viewer_id: Option<i32>,
) -> Result<Vec<UserView>, AppError> {
    let followed = match viewer_id {
        Some(viewer_id) => {
            let ids: Vec<i32> = users.iter().map(|u| u.id).collect();
            relation_service::followed_among(&app_state.db_pool, viewer_id, &ids).await?
        }
        None => HashSet::new(),
    };
    Ok(users
        .iter()
        .map(|u| UserView::render(u, followed.contains(&u.id), &app_state.config.public_url))
        .collect())
}

/// Each author with up to `recipes_limit` of their newest recipes and their total recipe count.
async fn render_subscriptions(
    app_state: &AppState,
    authors: &[user::Model],
    viewer_id: i32,
    recipes_limit: Option<usize>,
) -> Result<Vec<SubscriptionView>, AppError> {
    let db = &app_state.db_pool;
    let public_url = &app_state.config.public_url;
    let author_ids: Vec<i32> = authors.iter().map(|a| a.id).collect();

    let followed = relation_service::followed_among(db, viewer_id, &author_ids).await?;
    let mut recipes = recipe_query_service::recipes_by_authors(db, &author_ids, recipes_limit).await?;
    let counts = recipe_query_service::recipe_counts_by_author(db, &author_ids).await?;

    Ok(authors
        .iter()
        .map(|author| SubscriptionView {
            author: UserView::render(author, followed.contains(&author.id), public_url),
            recipes: recipes
                .remove(&author.id)
                .unwrap_or_default()
                .iter()
                .map(|recipe| RecipeShortView::render(recipe, public_url))
                .collect(),
            recipes_count: counts.get(&author.id).copied().unwrap_or_default(),
        })
        .collect())
}

// --- Route Handlers ---

async fn list_users_handler(
    State(app_state): State<Arc<AppState>>,
    MaybeUser(viewer): MaybeUser,
    OriginalUri(uri): OriginalUri,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Paginated<UserView>>, AppError> {
    let request = page.resolve()?;
    let (users, count) = fetch_page(&app_state.db_pool, user_service::all_users(), request).await?;
    let results = render_users(&app_state, &users, viewer.map(|v| v.id)).await?;
    Ok(Json(Paginated::new(results, count, request, &app_state.config.public_url, &uri)))
}

async fn register_handler(
    State(app_state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<Value>,
) -> Result<(StatusCode, Json<RegisteredUserView>), AppError> {
    let form = Form::from_value(payload)?;
    let user = user_service::register_user(&app_state.db_pool, &form).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn me_handler(
    State(app_state): State<Arc<AppState>>,
    RequireUser(current): RequireUser,
) -> Result<Json<UserView>, AppError> {
    let user = user_service::get_user(&app_state.db_pool, current.id).await?;
    Ok(Json(UserView::render(&user, false, &app_state.config.public_url)))
}

async fn get_user_handler(
    State(app_state): State<Arc<AppState>>,
    MaybeUser(viewer): MaybeUser,
    PathParam(user_id): PathParam<i32>,
) -> Result<Json<UserView>, AppError> {
    let user = user_service::get_user(&app_state.db_pool, user_id).await?;
    let mut views = render_users(&app_state, std::slice::from_ref(&user), viewer.map(|v| v.id)).await?;
    views
        .pop()
        .map(Json)
        .ok_or_else(|| AppError::InternalServerError(format!("User {user_id} was not rendered.")))
}

async fn set_password_handler(
    State(app_state): State<Arc<AppState>>,
    RequireUser(current): RequireUser,
    JsonBody(payload): JsonBody<Value>,
) -> Result<StatusCode, AppError> {
    let form = Form::from_value(payload)?;
    user_service::set_password(&app_state.db_pool, current.id, &form).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn followed_page(
    app_state: &AppState,
    follower_id: i32,
    viewer_id: i32,
    recipes_limit: Option<usize>,
    page: PageParams,
    uri: &axum::http::Uri,
) -> Result<Paginated<SubscriptionView>, AppError> {
    let request = page.resolve()?;
    let (authors, count) = fetch_page(&app_state.db_pool, user_service::followed_authors(follower_id), request).await?;
    let results = render_subscriptions(app_state, &authors, viewer_id, recipes_limit).await?;
    Ok(Paginated::new(results, count, request, &app_state.config.public_url, uri))
}

async fn my_subscriptions_handler(
    State(app_state): State<Arc<AppState>>,
    RequireUser(current): RequireUser,
    OriginalUri(uri): OriginalUri,
    QueryParams(limit): QueryParams<RecipesLimitQuery>,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Paginated<SubscriptionView>>, AppError> {
    let page = followed_page(&app_state, current.id, current.id, limit.recipes_limit, page, &uri).await?;
    Ok(Json(page))
}

async fn user_subscriptions_handler(
    State(app_state): State<Arc<AppState>>,
    RequireUser(current): RequireUser,
    PathParam(user_id): PathParam<i32>,
    OriginalUri(uri): OriginalUri,
    QueryParams(limit): QueryParams<RecipesLimitQuery>,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Paginated<SubscriptionView>>, AppError> {
    let follower = user_service::get_user(&app_state.db_pool, user_id).await?;
    let page = followed_page(&app_state, follower.id, current.id, limit.recipes_limit, page, &uri).await?;
    Ok(Json(page))
}

async fn subscribe_handler(
    State(app_state): State<Arc<AppState>>,
    RequireUser(current): RequireUser,
    PathParam(author_id): PathParam<i32>,
    QueryParams(limit): QueryParams<RecipesLimitQuery>,
) -> Result<(StatusCode, Json<SubscriptionView>), AppError> {
    let author = user_service::get_user(&app_state.db_pool, author_id).await?;
    relation_service::add::<SubscriptionRelation>(&app_state.db_pool, current.id, author.id).await?;
    let mut views =
        render_subscriptions(&app_state, std::slice::from_ref(&author), current.id, limit.recipes_limit).await?;
    let view = views
        .pop()
        .ok_or_else(|| AppError::InternalServerError(format!("Subscription to {author_id} was not rendered.")))?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn unsubscribe_handler(
    State(app_state): State<Arc<AppState>>,
    RequireUser(current): RequireUser,
    PathParam(author_id): PathParam<i32>,
) -> Result<StatusCode, AppError> {
    let author = user_service::get_user(&app_state.db_pool, author_id).await?;
    relation_service::remove::<SubscriptionRelation>(&app_state.db_pool, current.id, author.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_avatar_handler(
    State(app_state): State<Arc<AppState>>,
    RequireUser(current): RequireUser,
    JsonBody(payload): JsonBody<Value>,
) -> Result<Json<AvatarResponse>, AppError> {
    let form = Form::from_value(payload)?;
    let updated = user_service::set_avatar(&app_state.db_pool, &app_state.media, current.id, &form).await?;
    let avatar = updated
        .avatar
        .as_deref()
        .map(|path| media_url(&app_state.config.public_url, path))
        .ok_or_else(|| AppError::InternalServerError(format!("Avatar of user {} was not stored.", current.id)))?;
    Ok(Json(AvatarResponse { avatar }))
}

async fn clear_avatar_handler(
    State(app_state): State<Arc<AppState>>,
    RequireUser(current): RequireUser,
) -> Result<StatusCode, AppError> {
    user_service::clear_avatar(&app_state.db_pool, &app_state.media, current.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Router ---

pub fn create_user_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users/", get(list_users_handler).post(register_handler))
        .route("/api/users/me/", get(me_handler))
        .route(
            "/api/users/me/avatar/",
            put(set_avatar_handler)
                .patch(set_avatar_handler)
                .delete(clear_avatar_handler),
        )
        .route("/api/users/set_password/", post(set_password_handler))
        .route("/api/users/subscriptions/", get(my_subscriptions_handler))
        .route("/api/users/{user_id}/", get(get_user_handler))
        .route("/api/users/{user_id}/subscriptions/", get(user_subscriptions_handler))
        .route(
            "/api/users/{user_id}/subscribe/",
            post(subscribe_handler).delete(unsubscribe_handler),
        )
}
