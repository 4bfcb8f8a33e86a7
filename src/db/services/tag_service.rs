use std::collections::HashSet;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::db::entities::{prelude::Tag, tag};

pub async fn list_tags<C: ConnectionTrait>(db: &C) -> Result<Vec<tag::Model>, DbErr> {
    Tag::find().order_by_asc(tag::Column::Id).all(db).await
}

pub async fn find_tag<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<tag::Model>, DbErr> {
    Tag::find_by_id(id).one(db).await
}

/// The subset of `ids` that name stored tags.
pub async fn existing_tag_ids<C: ConnectionTrait>(db: &C, ids: &[i32]) -> Result<HashSet<i32>, DbErr> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }
    let found: Vec<i32> = Tag::find()
        .select_only()
        .column(tag::Column::Id)
        .filter(tag::Column::Id.is_in(ids.iter().copied()))
        .into_tuple()
        .all(db)
        .await?;
    Ok(found.into_iter().collect())
}

/// Ids of the tags carrying any of the given slugs.
pub async fn tag_ids_for_slugs<C: ConnectionTrait>(db: &C, slugs: &[String]) -> Result<Vec<i32>, DbErr> {
    if slugs.is_empty() {
        return Ok(Vec::new());
    }
    Tag::find()
        .select_only()
        .column(tag::Column::Id)
        .filter(tag::Column::Slug.is_in(slugs.iter().cloned()))
        .into_tuple()
        .all(db)
        .await
}

/// Looks the tag up by slug and creates it when missing. The flag is `true` when a row was
/// inserted.
pub async fn get_or_create_tag<C: ConnectionTrait>(
    db: &C,
    name: &str,
    slug: &str,
) -> Result<(tag::Model, bool), DbErr> {
    if let Some(model) = Tag::find().filter(tag::Column::Slug.eq(slug)).one(db).await? {
        return Ok((model, false));
    }
    let model = tag::ActiveModel {
        name: Set(name.to_string()),
        slug: Set(slug.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok((model, true))
}
