//! Recipe reads: the filtered listing and the batch loading of everything a rendered recipe
//! shows.

use std::collections::{HashMap, HashSet};

use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Select,
};

use crate::db::entities::{
    ingredient, recipe, recipe_ingredient, recipe_tag, tag, user,
    prelude::{Recipe, RecipeIngredient, RecipeTag, Tag, User},
};
use crate::db::services::{relation_service, tag_service};

/// Listing filters. Relation flags only apply when there is a viewer to relate to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<i32>,
    /// Tag slugs; a recipe matches when it carries any of them.
    pub tags: Vec<String>,
    pub is_favorited: Option<bool>,
    pub is_in_shopping_cart: Option<bool>,
}

/// Builds the listing query, newest first. `None` means no recipe can match.
pub async fn filtered_recipes<C: ConnectionTrait>(
    db: &C,
    filter: &RecipeFilter,
    viewer_id: Option<i32>,
) -> Result<Option<Select<Recipe>>, DbErr> {
    let mut query = Recipe::find();

    if let Some(author_id) = filter.author {
        query = query.filter(recipe::Column::AuthorId.eq(author_id));
    }

    if !filter.tags.is_empty() {
        let tag_ids = tag_service::tag_ids_for_slugs(db, &filter.tags).await?;
        if tag_ids.is_empty() {
            return Ok(None);
        }
        let tagged = Query::select()
            .column(recipe_tag::Column::RecipeId)
            .from(RecipeTag)
            .and_where(recipe_tag::Column::TagId.is_in(tag_ids))
            .to_owned();
        query = query.filter(recipe::Column::Id.in_subquery(tagged));
    }

    if let Some(viewer_id) = viewer_id {
        if let Some(wanted) = filter.is_favorited {
            let favorites = relation_service::favorite_recipe_ids_query(viewer_id);
            query = query.filter(if wanted {
                recipe::Column::Id.in_subquery(favorites)
            } else {
                recipe::Column::Id.not_in_subquery(favorites)
            });
        }
        if let Some(wanted) = filter.is_in_shopping_cart {
            let cart = relation_service::cart_recipe_ids_query(viewer_id);
            query = query.filter(if wanted {
                recipe::Column::Id.in_subquery(cart)
            } else {
                recipe::Column::Id.not_in_subquery(cart)
            });
        }
    }

    Ok(Some(newest_first(query)))
}

pub fn newest_first(query: Select<Recipe>) -> Select<Recipe> {
    query
        .order_by_desc(recipe::Column::CreatedAt)
        .order_by_desc(recipe::Column::Id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientLine {
    pub ingredient: ingredient::Model,
    pub amount: i32,
}

/// Everything needed to render a batch of recipes for one viewer.
#[derive(Debug, Default)]
pub struct RecipeDetails {
    pub authors: HashMap<i32, user::Model>,
    pub ingredients: HashMap<i32, Vec<IngredientLine>>,
    pub tags: HashMap<i32, Vec<tag::Model>>,
    pub favorited: HashSet<i32>,
    pub in_cart: HashSet<i32>,
    /// Authors the viewer follows.
    pub followed_authors: HashSet<i32>,
}

impl RecipeDetails {
    pub fn ingredients_of(&self, recipe_id: i32) -> &[IngredientLine] {
        self.ingredients.get(&recipe_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tags_of(&self, recipe_id: i32) -> &[tag::Model] {
        self.tags.get(&recipe_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub async fn load_recipe_details<C: ConnectionTrait>(
    db: &C,
    recipes: &[recipe::Model],
    viewer_id: Option<i32>,
) -> Result<RecipeDetails, DbErr> {
    let mut details = RecipeDetails::default();
    if recipes.is_empty() {
        return Ok(details);
    }

    let recipe_ids: Vec<i32> = recipes.iter().map(|r| r.id).collect();
    let mut author_ids: Vec<i32> = recipes.iter().map(|r| r.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    details.authors = User::find()
        .filter(user::Column::Id.is_in(author_ids.iter().copied()))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let lines = RecipeIngredient::find()
        .find_also_related(ingredient::Entity)
        .filter(recipe_ingredient::Column::RecipeId.is_in(recipe_ids.iter().copied()))
        .order_by_asc(ingredient::Column::Name)
        .all(db)
        .await?;
    for (row, ingredient) in lines {
        if let Some(ingredient) = ingredient {
            details.ingredients.entry(row.recipe_id).or_default().push(IngredientLine {
                ingredient,
                amount: row.amount,
            });
        }
    }

    let tag_links = RecipeTag::find()
        .find_also_related(Tag)
        .filter(recipe_tag::Column::RecipeId.is_in(recipe_ids.iter().copied()))
        .order_by_asc(tag::Column::Id)
        .all(db)
        .await?;
    for (link, tag) in tag_links {
        if let Some(tag) = tag {
            details.tags.entry(link.recipe_id).or_default().push(tag);
        }
    }

    if let Some(viewer_id) = viewer_id {
        details.favorited = relation_service::favorited_among(db, viewer_id, &recipe_ids).await?;
        details.in_cart = relation_service::in_cart_among(db, viewer_id, &recipe_ids).await?;
        details.followed_authors = relation_service::followed_among(db, viewer_id, &author_ids).await?;
    }

    Ok(details)
}

/// Each author's recipes, newest first, cut to `limit` per author when given.
pub async fn recipes_by_authors<C: ConnectionTrait>(
    db: &C,
    author_ids: &[i32],
    limit: Option<usize>,
) -> Result<HashMap<i32, Vec<recipe::Model>>, DbErr> {
    let mut grouped: HashMap<i32, Vec<recipe::Model>> = HashMap::new();
    if author_ids.is_empty() {
        return Ok(grouped);
    }
    let recipes = newest_first(Recipe::find().filter(recipe::Column::AuthorId.is_in(author_ids.iter().copied())))
        .all(db)
        .await?;
    for recipe in recipes {
        let entry = grouped.entry(recipe.author_id).or_default();
        if limit.is_none_or(|limit| entry.len() < limit) {
            entry.push(recipe);
        }
    }
    Ok(grouped)
}

pub async fn recipe_counts_by_author<C: ConnectionTrait>(
    db: &C,
    author_ids: &[i32],
) -> Result<HashMap<i32, u64>, DbErr> {
    if author_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let counts: Vec<(i32, i64)> = Recipe::find()
        .select_only()
        .column(recipe::Column::AuthorId)
        .column_as(Expr::col(recipe::Column::Id).count(), "recipes_count")
        .filter(recipe::Column::AuthorId.is_in(author_ids.iter().copied()))
        .group_by(recipe::Column::AuthorId)
        .into_tuple()
        .all(db)
        .await?;
    Ok(counts
        .into_iter()
        .map(|(author_id, count)| (author_id, u64::try_from(count).unwrap_or_default()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::services::relation_service::{CartRelation, FavoriteRelation, SubscriptionRelation, add};
    use crate::db::test_support;
    use chrono::{Duration, Utc};
    use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

    async fn make_recipe(
        db: &DatabaseConnection,
        author: &user::Model,
        name: &str,
        age_minutes: i64,
        tags: &[&tag::Model],
    ) -> recipe::Model {
        let model = recipe::ActiveModel {
            author_id: Set(author.id),
            name: Set(name.to_string()),
            image: Set(None),
            text: Set("...".to_string()),
            cooking_time: Set(5),
            created_at: Set(Utc::now() - Duration::minutes(age_minutes)),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
        for tag in tags {
            recipe_tag::ActiveModel {
                recipe_id: Set(model.id),
                tag_id: Set(tag.id),
            }
            .insert(db)
            .await
            .unwrap();
        }
        model
    }

    async fn names(db: &DatabaseConnection, filter: &RecipeFilter, viewer: Option<i32>) -> Vec<String> {
        match filtered_recipes(db, filter, viewer).await.unwrap() {
            Some(query) => query.all(db).await.unwrap().into_iter().map(|r| r.name).collect(),
            None => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_filters() {
        let db = test_support::setup().await;
        let alice = test_support::user(&db, "alice").await;
        let bob = test_support::user(&db, "bob").await;
        let breakfast = test_support::tag(&db, "Breakfast", "breakfast").await;
        let lunch = test_support::tag(&db, "Lunch", "lunch").await;
        let dinner = test_support::tag(&db, "Dinner", "dinner").await;

        let oats = make_recipe(&db, &alice, "oats", 30, &[&breakfast]).await;
        let soup = make_recipe(&db, &alice, "soup", 20, &[&lunch, &dinner]).await;
        make_recipe(&db, &bob, "steak", 10, &[&dinner]).await;

        let all = RecipeFilter::default();
        assert_eq!(names(&db, &all, None).await, ["steak", "soup", "oats"]);

        let by_alice = RecipeFilter { author: Some(alice.id), ..Default::default() };
        assert_eq!(names(&db, &by_alice, None).await, ["soup", "oats"]);

        let tagged = RecipeFilter {
            tags: vec!["breakfast".to_string(), "lunch".to_string(), "unknown".to_string()],
            ..Default::default()
        };
        assert_eq!(names(&db, &tagged, None).await, ["soup", "oats"]);

        let unknown = RecipeFilter { tags: vec!["unknown".to_string()], ..Default::default() };
        assert!(names(&db, &unknown, None).await.is_empty());

        add::<FavoriteRelation>(&db, bob.id, oats.id).await.unwrap();
        add::<CartRelation>(&db, bob.id, soup.id).await.unwrap();

        let favorites = RecipeFilter { is_favorited: Some(true), ..Default::default() };
        assert_eq!(names(&db, &favorites, Some(bob.id)).await, ["oats"]);
        // Anonymous viewers are not filtered.
        assert_eq!(names(&db, &favorites, None).await.len(), 3);

        let not_favorites = RecipeFilter { is_favorited: Some(false), ..Default::default() };
        assert_eq!(names(&db, &not_favorites, Some(bob.id)).await, ["steak", "soup"]);

        let cart = RecipeFilter { is_in_shopping_cart: Some(true), ..Default::default() };
        assert_eq!(names(&db, &cart, Some(bob.id)).await, ["soup"]);
    }

    #[tokio::test]
    async fn test_details_for_viewer() {
        let db = test_support::setup().await;
        let alice = test_support::user(&db, "alice").await;
        let bob = test_support::user(&db, "bob").await;
        let dinner = test_support::tag(&db, "Dinner", "dinner").await;
        let salt = test_support::ingredient(&db, "salt", "g").await;
        let soup = make_recipe(&db, &alice, "soup", 0, &[&dinner]).await;
        recipe_ingredient::ActiveModel {
            recipe_id: Set(soup.id),
            ingredient_id: Set(salt.id),
            amount: Set(5),
        }
        .insert(&db)
        .await
        .unwrap();
        add::<FavoriteRelation>(&db, bob.id, soup.id).await.unwrap();
        add::<SubscriptionRelation>(&db, bob.id, alice.id).await.unwrap();

        let details = load_recipe_details(&db, std::slice::from_ref(&soup), Some(bob.id)).await.unwrap();
        assert_eq!(details.authors[&alice.id].username, "alice");
        assert_eq!(details.ingredients_of(soup.id), [IngredientLine { ingredient: salt, amount: 5 }]);
        assert_eq!(details.tags_of(soup.id), [dinner]);
        assert!(details.favorited.contains(&soup.id));
        assert!(!details.in_cart.contains(&soup.id));
        assert!(details.followed_authors.contains(&alice.id));

        let anonymous = load_recipe_details(&db, std::slice::from_ref(&soup), None).await.unwrap();
        assert!(anonymous.favorited.is_empty());
        assert!(anonymous.followed_authors.is_empty());
    }

    #[tokio::test]
    async fn test_recipes_by_authors_honours_limit() {
        let db = test_support::setup().await;
        let alice = test_support::user(&db, "alice").await;
        let bob = test_support::user(&db, "bob").await;
        let carol = test_support::user(&db, "carol").await;
        make_recipe(&db, &alice, "old", 30, &[]).await;
        make_recipe(&db, &alice, "mid", 20, &[]).await;
        make_recipe(&db, &alice, "new", 10, &[]).await;
        make_recipe(&db, &bob, "only", 5, &[]).await;

        let ids = [alice.id, bob.id, carol.id];
        let limited = recipes_by_authors(&db, &ids, Some(2)).await.unwrap();
        let alice_names: Vec<&str> = limited[&alice.id].iter().map(|r| r.name.as_str()).collect();
        assert_eq!(alice_names, ["new", "mid"]);
        assert_eq!(limited[&bob.id].len(), 1);
        assert!(!limited.contains_key(&carol.id));

        let unlimited = recipes_by_authors(&db, &ids, None).await.unwrap();
        assert_eq!(unlimited[&alice.id].len(), 3);

        let counts = recipe_counts_by_author(&db, &ids).await.unwrap();
        assert_eq!(counts.get(&alice.id), Some(&3));
        assert_eq!(counts.get(&bob.id), Some(&1));
        assert_eq!(counts.get(&carol.id), None);
    }
}
