use serde::Serialize;

use crate::db::entities::user;
use crate::services::media_storage::media_url;
use crate::web::models::recipe_models::RecipeShortView;

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub is_subscribed: bool,
}

impl UserView {
    pub fn render(user: &user::Model, is_subscribed: bool, public_url: &str) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            avatar: user.avatar.as_deref().map(|path| media_url(public_url, path)),
            is_subscribed,
        }
    }
}

/// Returned by registration: the account as stored, without viewer-dependent fields.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredUserView {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<user::Model> for RegisteredUserView {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

/// A followed author together with a preview of their recipes.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub author: UserView,
    pub recipes: Vec<RecipeShortView>,
    pub recipes_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvatarResponse {
    pub avatar: String,
}
