//! Creates the tables described by the entities when they are missing.
//!
//! Tables are created parents first so that foreign keys resolve on every backend.

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::{ingredient, prelude::*};

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;
    Ok(())
}

pub async fn create_tables<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    create_table(db, &schema, User).await?;
    create_table(db, &schema, Ingredient).await?;
    create_table(db, &schema, Tag).await?;
    create_table(db, &schema, Recipe).await?;
    create_table(db, &schema, RecipeIngredient).await?;
    create_table(db, &schema, RecipeTag).await?;
    create_table(db, &schema, Favorite).await?;
    create_table(db, &schema, ShoppingCart).await?;
    create_table(db, &schema, Subscription).await?;

    // Ingredient search is a name prefix/substring lookup
    let name_index = Index::create()
        .if_not_exists()
        .name("idx_ingredients_name")
        .table(Ingredient)
        .col(ingredient::Column::Name)
        .to_owned();
    db.execute(backend.build(&name_index)).await?;

    info!(backend = ?backend, "Database schema is up to date.");
    Ok(())
}
