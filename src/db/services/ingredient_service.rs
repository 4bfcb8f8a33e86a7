use std::collections::HashSet;

use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::db::entities::{ingredient, prelude::Ingredient};

/// Ingredients whose name contains `name`, ignoring case, ordered by name.
pub async fn search_ingredients<C: ConnectionTrait>(
    db: &C,
    name: Option<&str>,
) -> Result<Vec<ingredient::Model>, DbErr> {
    let mut query = Ingredient::find();
    if let Some(needle) = name.map(str::trim).filter(|n| !n.is_empty()) {
        let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
        query = query.filter(
            Expr::expr(Func::lower(Expr::col(ingredient::Column::Name)))
                .like(LikeExpr::new(pattern).escape('\\')),
        );
    }
    query
        .order_by_asc(ingredient::Column::Name)
        .order_by_asc(ingredient::Column::Id)
        .all(db)
        .await
}

pub async fn find_ingredient<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<Option<ingredient::Model>, DbErr> {
    Ingredient::find_by_id(id).one(db).await
}

/// The subset of `ids` that name stored ingredients.
pub async fn existing_ingredient_ids<C: ConnectionTrait>(
    db: &C,
    ids: &[i32],
) -> Result<HashSet<i32>, DbErr> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }
    let found: Vec<i32> = Ingredient::find()
        .select_only()
        .column(ingredient::Column::Id)
        .filter(ingredient::Column::Id.is_in(ids.iter().copied()))
        .into_tuple()
        .all(db)
        .await?;
    Ok(found.into_iter().collect())
}

/// Returns the existing ingredient with this name and unit, creating it if needed.
/// The flag is `true` when a row was inserted.
pub async fn get_or_create_ingredient<C: ConnectionTrait>(
    db: &C,
    name: &str,
    measurement_unit: &str,
) -> Result<(ingredient::Model, bool), DbErr> {
    let existing = Ingredient::find()
        .filter(ingredient::Column::Name.eq(name))
        .filter(ingredient::Column::MeasurementUnit.eq(measurement_unit))
        .one(db)
        .await?;
    if let Some(model) = existing {
        return Ok((model, false));
    }

    let model = ingredient::ActiveModel {
        name: Set(name.to_string()),
        measurement_unit: Set(measurement_unit.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok((model, true))
}

fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
