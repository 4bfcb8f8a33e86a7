//! Response shapes for recipes.
//!
//! Which shape a handler returns is fixed per operation: listing, retrieval, create and update
//! return [`RecipeView`]; favorite and cart additions return [`RecipeShortView`]; subscription
//! endpoints embed short views inside a `SubscriptionView`. The viewer only enters through the
//! relation sets in [`RecipeDetails`], which are empty for anonymous requests.

use serde::Serialize;

use crate::db::entities::{recipe, tag};
use crate::db::services::recipe_query_service::RecipeDetails;
use crate::services::media_storage::media_url;
use crate::web::error::AppError;
use crate::web::models::user_models::UserView;

#[derive(Debug, Clone, Serialize)]
pub struct RecipeIngredientView {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeView {
    pub id: i32,
    pub author: UserView,
    pub name: String,
    pub image: Option<String>,
    pub text: String,
    pub ingredients: Vec<RecipeIngredientView>,
    pub tags: Vec<tag::Model>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub cooking_time: i32,
}

impl RecipeView {
    pub fn render(recipe: &recipe::Model, details: &RecipeDetails, public_url: &str) -> Result<Self, AppError> {
        let author = details.authors.get(&recipe.author_id).ok_or_else(|| {
            AppError::InternalServerError(format!("Author {} of recipe {} was not loaded.", recipe.author_id, recipe.id))
        })?;

        Ok(Self {
            id: recipe.id,
            author: UserView::render(
                author,
                details.followed_authors.contains(&author.id),
                public_url,
            ),
            name: recipe.name.clone(),
            image: recipe.image.as_deref().map(|path| media_url(public_url, path)),
            text: recipe.text.clone(),
            ingredients: details
                .ingredients_of(recipe.id)
                .iter()
                .map(|line| RecipeIngredientView {
                    id: line.ingredient.id,
                    name: line.ingredient.name.clone(),
                    measurement_unit: line.ingredient.measurement_unit.clone(),
                    amount: line.amount,
                })
                .collect(),
            tags: details.tags_of(recipe.id).to_vec(),
            is_favorited: details.favorited.contains(&recipe.id),
            is_in_shopping_cart: details.in_cart.contains(&recipe.id),
            cooking_time: recipe.cooking_time,
        })
    }

    pub fn render_all(
        recipes: &[recipe::Model],
        details: &RecipeDetails,
        public_url: &str,
    ) -> Result<Vec<Self>, AppError> {
        recipes
            .iter()
            .map(|recipe| Self::render(recipe, details, public_url))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeShortView {
    pub id: i32,
    pub name: String,
    pub image: Option<String>,
    pub cooking_time: i32,
}

impl RecipeShortView {
    pub fn render(recipe: &recipe::Model, public_url: &str) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.clone(),
            image: recipe.image.as_deref().map(|path| media_url(public_url, path)),
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShortLinkResponse {
    #[serde(rename = "short-link")]
    pub short_link: String,
}
