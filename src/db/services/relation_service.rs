//! Favorites, shopping cart entries and subscriptions.
//!
//! All three are plain `(owner, target)` pairs with the same add/remove rules, so the toggles
//! are written once over [`PairRelation`]. The lookup functions below go one way only, from an
//! owner to the targets it is related to.

use std::collections::HashSet;

use async_trait::async_trait;
use sea_orm::sea_query::{Query, SelectStatement};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QuerySelect, SqlErr, TransactionTrait,
};
use thiserror::Error;
use tracing::info;

use crate::db::entities::{
    favorite, shopping_cart, subscription,
    prelude::{Favorite, ShoppingCart, Subscription},
};

#[derive(Debug, Error)]
pub enum RelationError {
    #[error("Database error: {0}")]
    Db(#[from] DbErr),
    #[error("{0}")]
    AlreadyPresent(&'static str),
    #[error("{0}")]
    NotPresent(&'static str),
    #[error("{0}")]
    SelfTarget(&'static str),
}

#[async_trait]
pub trait PairRelation {
    const NAME: &'static str;
    const ALREADY_PRESENT: &'static str;
    const NOT_PRESENT: &'static str;

    /// Rejects pairs that may never exist.
    fn check_pair(_owner_id: i32, _target_id: i32) -> Result<(), RelationError> {
        Ok(())
    }

    async fn exists(txn: &DatabaseTransaction, owner_id: i32, target_id: i32) -> Result<bool, DbErr>;
    async fn insert(txn: &DatabaseTransaction, owner_id: i32, target_id: i32) -> Result<(), DbErr>;
    /// Returns the number of deleted rows.
    async fn delete(txn: &DatabaseTransaction, owner_id: i32, target_id: i32) -> Result<u64, DbErr>;
}

pub struct FavoriteRelation;
pub struct CartRelation;
pub struct SubscriptionRelation;

#[async_trait]
impl PairRelation for FavoriteRelation {
    const NAME: &'static str = "favorite";
    const ALREADY_PRESENT: &'static str = "Recipe is already in favorites.";
    const NOT_PRESENT: &'static str = "Recipe is not in favorites.";

    async fn exists(txn: &DatabaseTransaction, owner_id: i32, target_id: i32) -> Result<bool, DbErr> {
        Ok(Favorite::find_by_id((owner_id, target_id)).one(txn).await?.is_some())
    }

    async fn insert(txn: &DatabaseTransaction, owner_id: i32, target_id: i32) -> Result<(), DbErr> {
        let row = favorite::ActiveModel {
            user_id: sea_orm::Set(owner_id),
            recipe_id: sea_orm::Set(target_id),
        };
        Favorite::insert(row).exec_without_returning(txn).await?;
        Ok(())
    }

    async fn delete(txn: &DatabaseTransaction, owner_id: i32, target_id: i32) -> Result<u64, DbErr> {
        let result = Favorite::delete_many()
            .filter(favorite::Column::UserId.eq(owner_id))
            .filter(favorite::Column::RecipeId.eq(target_id))
            .exec(txn)
            .await?;
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl PairRelation for CartRelation {
    const NAME: &'static str = "shopping cart";
    const ALREADY_PRESENT: &'static str = "Recipe is already in the shopping cart.";
    const NOT_PRESENT: &'static str = "Recipe is not in the shopping cart.";

    async fn exists(txn: &DatabaseTransaction, owner_id: i32, target_id: i32) -> Result<bool, DbErr> {
        Ok(ShoppingCart::find_by_id((owner_id, target_id)).one(txn).await?.is_some())
    }

    async fn insert(txn: &DatabaseTransaction, owner_id: i32, target_id: i32) -> Result<(), DbErr> {
        let row = shopping_cart::ActiveModel {
            user_id: sea_orm::Set(owner_id),
            recipe_id: sea_orm::Set(target_id),
        };
        ShoppingCart::insert(row).exec_without_returning(txn).await?;
        Ok(())
    }

    async fn delete(txn: &DatabaseTransaction, owner_id: i32, target_id: i32) -> Result<u64, DbErr> {
        let result = ShoppingCart::delete_many()
            .filter(shopping_cart::Column::UserId.eq(owner_id))
            .filter(shopping_cart::Column::RecipeId.eq(target_id))
            .exec(txn)
            .await?;
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl PairRelation for SubscriptionRelation {
    const NAME: &'static str = "subscription";
    const ALREADY_PRESENT: &'static str = "You are already subscribed to this author.";
    const NOT_PRESENT: &'static str = "You are not subscribed to this author.";

    fn check_pair(owner_id: i32, target_id: i32) -> Result<(), RelationError> {
        if owner_id == target_id {
            return Err(RelationError::SelfTarget("You cannot subscribe to yourself."));
        }
        Ok(())
    }

    async fn exists(txn: &DatabaseTransaction, owner_id: i32, target_id: i32) -> Result<bool, DbErr> {
        Ok(Subscription::find_by_id((owner_id, target_id)).one(txn).await?.is_some())
    }

    async fn insert(txn: &DatabaseTransaction, owner_id: i32, target_id: i32) -> Result<(), DbErr> {
        let row = subscription::ActiveModel {
            user_id: sea_orm::Set(owner_id),
            author_id: sea_orm::Set(target_id),
        };
        Subscription::insert(row).exec_without_returning(txn).await?;
        Ok(())
    }

    async fn delete(txn: &DatabaseTransaction, owner_id: i32, target_id: i32) -> Result<u64, DbErr> {
        let result = Subscription::delete_many()
            .filter(subscription::Column::UserId.eq(owner_id))
            .filter(subscription::Column::AuthorId.eq(target_id))
            .exec(txn)
            .await?;
        Ok(result.rows_affected)
    }
}

/// A duplicate key on insert means the pair already exists.
fn insert_error<R: PairRelation>(err: DbErr) -> RelationError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => RelationError::AlreadyPresent(R::ALREADY_PRESENT),
        _ => RelationError::Db(err),
    }
}

/// Creates the pair. Fails with [`RelationError::AlreadyPresent`] when it exists, including
/// when a concurrent insert wins the race and the storage layer reports the duplicate.
pub async fn add<R: PairRelation>(db: &DatabaseConnection, owner_id: i32, target_id: i32) -> Result<(), RelationError> {
    R::check_pair(owner_id, target_id)?;

    let txn = db.begin().await?;
    if R::exists(&txn, owner_id, target_id).await? {
        return Err(RelationError::AlreadyPresent(R::ALREADY_PRESENT));
    }
    R::insert(&txn, owner_id, target_id).await.map_err(insert_error::<R>)?;
    txn.commit().await?;

    info!(relation = R::NAME, owner_id, target_id, "Relation added.");
    Ok(())
}

/// Deletes the pair. Fails with [`RelationError::NotPresent`] and deletes nothing when it is
/// absent.
pub async fn remove<R: PairRelation>(db: &DatabaseConnection, owner_id: i32, target_id: i32) -> Result<(), RelationError> {
    let txn = db.begin().await?;
    if R::delete(&txn, owner_id, target_id).await? == 0 {
        return Err(RelationError::NotPresent(R::NOT_PRESENT));
    }
    txn.commit().await?;

    info!(relation = R::NAME, owner_id, target_id, "Relation removed.");
    Ok(())
}

// --- One-directional lookups ---

/// Recipes among `recipe_ids` that the user has favorited.
pub async fn favorited_among<C: ConnectionTrait>(db: &C, user_id: i32, recipe_ids: &[i32]) -> Result<HashSet<i32>, DbErr> {
    if recipe_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let ids: Vec<i32> = Favorite::find()
        .select_only()
        .column(favorite::Column::RecipeId)
        .filter(favorite::Column::UserId.eq(user_id))
        .filter(favorite::Column::RecipeId.is_in(recipe_ids.iter().copied()))
        .into_tuple()
        .all(db)
        .await?;
    Ok(ids.into_iter().collect())
}

/// Recipes among `recipe_ids` that are in the user's shopping cart.
pub async fn in_cart_among<C: ConnectionTrait>(db: &C, user_id: i32, recipe_ids: &[i32]) -> Result<HashSet<i32>, DbErr> {
    if recipe_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let ids: Vec<i32> = ShoppingCart::find()
        .select_only()
        .column(shopping_cart::Column::RecipeId)
        .filter(shopping_cart::Column::UserId.eq(user_id))
        .filter(shopping_cart::Column::RecipeId.is_in(recipe_ids.iter().copied()))
        .into_tuple()
        .all(db)
        .await?;
    Ok(ids.into_iter().collect())
}

/// Authors among `author_ids` that the user follows.
pub async fn followed_among<C: ConnectionTrait>(db: &C, user_id: i32, author_ids: &[i32]) -> Result<HashSet<i32>, DbErr> {
    if author_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let ids: Vec<i32> = Subscription::find()
        .select_only()
        .column(subscription::Column::AuthorId)
        .filter(subscription::Column::UserId.eq(user_id))
        .filter(subscription::Column::AuthorId.is_in(author_ids.iter().copied()))
        .into_tuple()
        .all(db)
        .await?;
    Ok(ids.into_iter().collect())
}

pub async fn cart_recipe_ids<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<Vec<i32>, DbErr> {
    ShoppingCart::find()
        .select_only()
        .column(shopping_cart::Column::RecipeId)
        .filter(shopping_cart::Column::UserId.eq(user_id))
        .into_tuple()
        .all(db)
        .await
}

/// `SELECT recipe_id FROM favorites WHERE user_id = ?`, for use as a subquery.
pub fn favorite_recipe_ids_query(user_id: i32) -> SelectStatement {
    Query::select()
        .column(favorite::Column::RecipeId)
        .from(Favorite)
        .and_where(favorite::Column::UserId.eq(user_id))
        .to_owned()
}

pub fn cart_recipe_ids_query(user_id: i32) -> SelectStatement {
    Query::select()
        .column(shopping_cart::Column::RecipeId)
        .from(ShoppingCart)
        .and_where(shopping_cart::Column::UserId.eq(user_id))
        .to_owned()
}

pub fn followed_author_ids_query(user_id: i32) -> SelectStatement {
    Query::select()
        .column(subscription::Column::AuthorId)
        .from(Subscription)
        .and_where(subscription::Column::UserId.eq(user_id))
        .to_owned()
}
