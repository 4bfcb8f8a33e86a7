use axum::{
    Router,
    http::{Method, header},
    middleware as axum_middleware,
    routing::get,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::server::config::ServerConfig;
use crate::services::media_storage::MediaStorage;
use crate::web::{middleware::auth, routes::*};

pub mod error;
pub mod extract;
pub mod form;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabaseConnection,
    pub config: Arc<ServerConfig>,
    pub media: MediaStorage,
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(db_pool: DatabaseConnection, config: Arc<ServerConfig>, media: MediaStorage) -> Router {
    let media_files = ServeDir::new(media.root());
    let app_state = Arc::new(AppState { db_pool, config, media });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .merge(auth_routes::create_auth_router())
        .merge(user_routes::create_user_router())
        .merge(tag_routes::create_tag_router())
        .merge(ingredient_routes::create_ingredient_router())
        .merge(recipe_routes::create_recipe_router())
        .merge(link_routes::create_link_router())
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::identify))
        .with_state(app_state)
        .nest_service("/media", media_files)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
