use std::collections::BTreeMap;

use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, FromQueryResult, JoinType, QueryFilter,
    QuerySelect, RelationTrait,
};
use serde::Serialize;

use crate::db::entities::{ingredient, prelude::RecipeIngredient, recipe_ingredient};
use crate::db::services::relation_service;

/// One ingredient row of one recipe in the cart.
#[derive(Debug, Clone, FromQueryResult)]
pub struct CartIngredientRow {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingListLine {
    pub name: String,
    pub measurement_unit: String,
    pub total: i64,
}

/// Ingredient rows of every recipe in the user's cart, one per (recipe, ingredient).
pub async fn cart_ingredient_rows<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<Vec<CartIngredientRow>, DbErr> {
    let recipe_ids = relation_service::cart_recipe_ids(db, user_id).await?;
    if recipe_ids.is_empty() {
        return Ok(Vec::new());
    }

    RecipeIngredient::find()
        .select_only()
        .column_as(ingredient::Column::Name, "name")
        .column_as(ingredient::Column::MeasurementUnit, "measurement_unit")
        .column_as(recipe_ingredient::Column::Amount, "amount")
        .join(JoinType::InnerJoin, recipe_ingredient::Relation::Ingredient.def())
        .filter(recipe_ingredient::Column::RecipeId.is_in(recipe_ids))
        .into_model::<CartIngredientRow>()
        .all(db)
        .await
}

/// Sums amounts per (name, unit). Distinct ingredient rows that share a name and unit are
/// merged. Lines come out sorted by name, then unit.
pub fn aggregate(rows: impl IntoIterator<Item = CartIngredientRow>) -> Vec<ShoppingListLine> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for row in rows {
        *totals.entry((row.name, row.measurement_unit)).or_default() += i64::from(row.amount);
    }
    totals
        .into_iter()
        .map(|((name, measurement_unit), total)| ShoppingListLine {
            name,
            measurement_unit,
            total,
        })
        .collect()
}

/// One `"{name} ({unit}) - {total}"` line per entry.
pub fn render(lines: &[ShoppingListLine]) -> String {
    lines
        .iter()
        .map(|line| format!("{} ({}) - {}\n", line.name, line.measurement_unit, line.total))
        .collect()
}

pub async fn shopping_list<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<Vec<ShoppingListLine>, DbErr> {
    Ok(aggregate(cart_ingredient_rows(db, user_id).await?))
}
