//! Recipe writes. Every write validates the whole payload first and then touches the
//! database inside a single transaction.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, IntoActiveModel, QueryFilter, Set, TransactionTrait,
};
use tracing::info;

use crate::db::entities::{
    favorite, recipe, recipe_ingredient, recipe_tag, shopping_cart,
    prelude::{Favorite, Recipe, RecipeIngredient, RecipeTag, ShoppingCart},
};
use crate::db::services::{ingredient_service, tag_service};
use crate::services::media_storage::MediaStorage;
use crate::services::recipe_validator::{DraftMode, IngredientAmount, RecipeDraft};
use crate::web::error::AppError;
use crate::web::form::Form;

pub const RECIPE_IMAGE_DIR: &str = "recipes/images";

pub async fn find_recipe<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<recipe::Model>, DbErr> {
    Recipe::find_by_id(id).one(db).await
}

pub async fn get_recipe<C: ConnectionTrait>(db: &C, id: i32) -> Result<recipe::Model, AppError> {
    find_recipe(db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("No Recipe matches the given query.".to_string()))
}

/// Loads the recipe for a write by `editor_id`, which must be its author.
async fn get_recipe_for_edit(db: &DatabaseConnection, id: i32, editor_id: i32) -> Result<recipe::Model, AppError> {
    let recipe = get_recipe(db, id).await?;
    if recipe.author_id != editor_id {
        return Err(AppError::Forbidden(
            "You do not have permission to perform this action.".to_string(),
        ));
    }
    Ok(recipe)
}

async fn check_draft_references(db: &DatabaseConnection, draft: &RecipeDraft) -> Result<(), AppError> {
    let known_ingredients =
        ingredient_service::existing_ingredient_ids(db, &draft.referenced_ingredient_ids()).await?;
    let known_tags = tag_service::existing_tag_ids(db, &draft.referenced_tag_ids()).await?;
    draft.check_references(&known_ingredients, &known_tags)?;
    Ok(())
}

pub async fn create_recipe(
    db: &DatabaseConnection,
    media: &MediaStorage,
    author_id: i32,
    form: &Form,
) -> Result<recipe::Model, AppError> {
    let draft = RecipeDraft::parse(form, DraftMode::Create)?;
    check_draft_references(db, &draft).await?;

    let RecipeDraft {
        name: Some(name),
        text: Some(text),
        cooking_time: Some(cooking_time),
        image: Some(image),
        ingredients: Some(ingredients),
        tags: Some(tags),
    } = draft
    else {
        return Err(AppError::InternalServerError(
            "Validated recipe draft is missing a required field.".to_string(),
        ));
    };

    let image_path = media.save(RECIPE_IMAGE_DIR, &image).await?;
    let new_recipe = recipe::ActiveModel {
        author_id: Set(author_id),
        name: Set(name),
        image: Set(Some(image_path.clone())),
        text: Set(text),
        cooking_time: Set(cooking_time),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    let result = async {
        let txn = db.begin().await?;
        let created = new_recipe.insert(&txn).await?;
        write_ingredients(&txn, created.id, &ingredients).await?;
        write_tags(&txn, created.id, &tags).await?;
        txn.commit().await?;
        Ok::<_, DbErr>(created)
    }
    .await;

    match result {
        Ok(created) => {
            info!(
                recipe_id = created.id,
                author_id,
                ingredients = ingredients.len(),
                tags = tags.len(),
                "Recipe created."
            );
            Ok(created)
        }
        Err(e) => {
            media.remove(&image_path).await;
            Err(e.into())
        }
    }
}

/// Applies a partial update. Present scalars are overwritten, present `ingredients` and
/// `tags` replace the stored sets, absent keys are left alone.
pub async fn update_recipe(
    db: &DatabaseConnection,
    media: &MediaStorage,
    recipe_id: i32,
    editor_id: i32,
    form: &Form,
) -> Result<recipe::Model, AppError> {
    let current = get_recipe_for_edit(db, recipe_id, editor_id).await?;
    let draft = RecipeDraft::parse(form, DraftMode::Update)?;
    check_draft_references(db, &draft).await?;

    let new_image_path = match &draft.image {
        Some(image) => Some(media.save(RECIPE_IMAGE_DIR, image).await?),
        None => None,
    };

    let result = async {
        let txn = db.begin().await?;

        let updated = if draft.has_scalar_changes() {
            let mut active = current.clone().into_active_model();
            if let Some(name) = &draft.name {
                active.name = Set(name.clone());
            }
            if let Some(text) = &draft.text {
                active.text = Set(text.clone());
            }
            if let Some(cooking_time) = draft.cooking_time {
                active.cooking_time = Set(cooking_time);
            }
            if let Some(path) = &new_image_path {
                active.image = Set(Some(path.clone()));
            }
            active.update(&txn).await?
        } else {
            current.clone()
        };

        if let Some(ingredients) = &draft.ingredients {
            write_ingredients(&txn, recipe_id, ingredients).await?;
        }
        if let Some(tags) = &draft.tags {
            write_tags(&txn, recipe_id, tags).await?;
        }

        txn.commit().await?;
        Ok::<_, DbErr>(updated)
    }
    .await;

    match result {
        Ok(updated) => {
            if new_image_path.is_some() {
                if let Some(old) = &current.image {
                    media.remove(old).await;
                }
            }
            info!(recipe_id, editor_id, "Recipe updated.");
            Ok(updated)
        }
        Err(e) => {
            if let Some(path) = &new_image_path {
                media.remove(path).await;
            }
            Err(e.into())
        }
    }
}

pub async fn delete_recipe(
    db: &DatabaseConnection,
    media: &MediaStorage,
    recipe_id: i32,
    editor_id: i32,
) -> Result<(), AppError> {
    let recipe = get_recipe_for_edit(db, recipe_id, editor_id).await?;

    let txn = db.begin().await?;
    RecipeIngredient::delete_many()
        .filter(recipe_ingredient::Column::RecipeId.eq(recipe_id))
        .exec(&txn)
        .await?;
    RecipeTag::delete_many()
        .filter(recipe_tag::Column::RecipeId.eq(recipe_id))
        .exec(&txn)
        .await?;
    Favorite::delete_many()
        .filter(favorite::Column::RecipeId.eq(recipe_id))
        .exec(&txn)
        .await?;
    ShoppingCart::delete_many()
        .filter(shopping_cart::Column::RecipeId.eq(recipe_id))
        .exec(&txn)
        .await?;
    Recipe::delete_by_id(recipe_id).exec(&txn).await?;
    txn.commit().await?;

    if let Some(image) = &recipe.image {
        media.remove(image).await;
    }
    info!(recipe_id, editor_id, "Recipe deleted.");
    Ok(())
}

/// Replaces the recipe's ingredient rows with `items`.
async fn write_ingredients(txn: &DatabaseTransaction, recipe_id: i32, items: &[IngredientAmount]) -> Result<(), DbErr> {
    RecipeIngredient::delete_many()
        .filter(recipe_ingredient::Column::RecipeId.eq(recipe_id))
        .exec(txn)
        .await?;
    let rows = items.iter().map(|item| recipe_ingredient::ActiveModel {
        recipe_id: Set(recipe_id),
        ingredient_id: Set(item.ingredient_id),
        amount: Set(item.amount),
    });
    RecipeIngredient::insert_many(rows).exec_without_returning(txn).await?;
    Ok(())
}

/// Replaces the recipe's tag links with `tag_ids`.
async fn write_tags(txn: &DatabaseTransaction, recipe_id: i32, tag_ids: &[i32]) -> Result<(), DbErr> {
    RecipeTag::delete_many()
        .filter(recipe_tag::Column::RecipeId.eq(recipe_id))
        .exec(txn)
        .await?;
    let rows = tag_ids.iter().map(|tag_id| recipe_tag::ActiveModel {
        recipe_id: Set(recipe_id),
        tag_id: Set(*tag_id),
    });
    RecipeTag::insert_many(rows).exec_without_returning(txn).await?;
    Ok(())
}
