//! Turns a recipe write payload into a [`RecipeDraft`], collecting every field error before
//! anything is written.

use std::collections::HashSet;

use serde_json::Value;

use crate::services::image_codec::{DecodedImage, decode_data_url};
use crate::web::error::FieldErrors;
use crate::web::form::{Form, NOT_A_STRING, NOT_AN_INTEGER, Presence, as_integer};

pub const MIN_VALUE: i64 = 1;
pub const MAX_VALUE: i64 = 32000;
pub const MAX_NAME_LENGTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftMode {
    /// Every field is required.
    Create,
    /// Every field is optional; absent keys leave the stored value alone.
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub ingredient_id: i32,
    pub amount: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeDraft {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<DecodedImage>,
    /// `Some` replaces the whole ingredient set.
    pub ingredients: Option<Vec<IngredientAmount>>,
    /// `Some` replaces the whole tag set.
    pub tags: Option<Vec<i32>>,
}

impl RecipeDraft {
    pub fn parse(form: &Form, mode: DraftMode) -> Result<Self, FieldErrors> {
        let presence = match mode {
            DraftMode::Create => Presence::Required,
            DraftMode::Update => Presence::Optional,
        };
        let mut errors = FieldErrors::new();

        let name = form.text("name", presence, &mut errors);
        if let Some(name) = &name {
            if name.chars().count() > MAX_NAME_LENGTH {
                errors.add(
                    "name",
                    format!("Ensure this field has no more than {MAX_NAME_LENGTH} characters."),
                );
            }
        }
        let text = form.text("text", presence, &mut errors);
        let cooking_time = form
            .integer("cooking_time", presence, &mut errors)
            .and_then(|value| check_range("cooking_time", value, &mut errors));
        let image = parse_image(form, presence, &mut errors);
        let ingredients = form
            .value("ingredients", presence, &mut errors)
            .and_then(|value| parse_ingredients(value, &mut errors));
        let tags = form
            .value("tags", presence, &mut errors)
            .and_then(|value| parse_tags(value, &mut errors));

        errors.into_result(RecipeDraft {
            name,
            text,
            cooking_time,
            image,
            ingredients,
            tags,
        })
    }

    pub fn referenced_ingredient_ids(&self) -> Vec<i32> {
        self.ingredients
            .iter()
            .flatten()
            .map(|item| item.ingredient_id)
            .collect()
    }

    pub fn referenced_tag_ids(&self) -> Vec<i32> {
        self.tags.iter().flatten().copied().collect()
    }

    /// Reports ids that do not name a stored ingredient or tag. Unknown ids are a problem with
    /// the submitted field, so they are reported like any other field error.
    pub fn check_references(
        &self,
        known_ingredients: &HashSet<i32>,
        known_tags: &HashSet<i32>,
    ) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        for id in self.referenced_ingredient_ids() {
            if !known_ingredients.contains(&id) {
                errors.add("ingredients", format!("Ingredient with id {id} does not exist."));
            }
        }
        for id in self.referenced_tag_ids() {
            if !known_tags.contains(&id) {
                errors.add("tags", format!("Invalid pk \"{id}\" - object does not exist."));
            }
        }
        errors.into_result(())
    }

    pub fn has_scalar_changes(&self) -> bool {
        self.name.is_some() || self.text.is_some() || self.cooking_time.is_some() || self.image.is_some()
    }
}

fn check_range(field: &str, value: i64, errors: &mut FieldErrors) -> Option<i32> {
    if value < MIN_VALUE {
        errors.add(field, format!("Ensure this value is greater than or equal to {MIN_VALUE}."));
        return None;
    }
    if value > MAX_VALUE {
        errors.add(field, format!("Ensure this value is less than or equal to {MAX_VALUE}."));
        return None;
    }
    i32::try_from(value).ok()
}

fn parse_image(form: &Form, presence: Presence, errors: &mut FieldErrors) -> Option<DecodedImage> {
    let value = form.value("image", presence, errors)?;
    let Some(raw) = value.as_str() else {
        errors.add("image", NOT_A_STRING);
        return None;
    };
    match decode_data_url(raw) {
        Ok(image) => Some(image),
        Err(e) => {
            errors.add("image", e.to_string());
            None
        }
    }
}

fn expect_list<'a>(field: &str, value: &'a Value, errors: &mut FieldErrors) -> Option<&'a Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        _ => {
            errors.add(field, "Expected a list of items.");
            None
        }
    }
}

fn parse_id(value: &Value) -> Option<i32> {
    as_integer(value).and_then(|id| i32::try_from(id).ok())
}

fn parse_ingredients(value: &Value, errors: &mut FieldErrors) -> Option<Vec<IngredientAmount>> {
    const FIELD: &str = "ingredients";
    let items = expect_list(FIELD, value, errors)?;
    if items.is_empty() {
        errors.add(FIELD, "At least one ingredient is required.");
        return None;
    }

    let mut parsed = Vec::with_capacity(items.len());
    let mut seen = HashSet::new();
    let mut valid = true;
    for item in items {
        let Some(entry) = item.as_object() else {
            errors.add(FIELD, "Each ingredient must be an object with \"id\" and \"amount\".");
            valid = false;
            continue;
        };

        let ingredient_id = match entry.get("id") {
            None | Some(Value::Null) => {
                errors.add(FIELD, "Ingredient id is required.");
                None
            }
            Some(raw) => {
                let id = parse_id(raw);
                if id.is_none() {
                    errors.add(FIELD, format!("Ingredient id: {NOT_AN_INTEGER}"));
                }
                id
            }
        };
        let amount = match entry.get("amount") {
            None | Some(Value::Null) => {
                errors.add(FIELD, "Ingredient amount is required.");
                None
            }
            Some(raw) => match as_integer(raw) {
                Some(amount) if (MIN_VALUE..=MAX_VALUE).contains(&amount) => i32::try_from(amount).ok(),
                Some(_) => {
                    errors.add(
                        FIELD,
                        format!("Ingredient amount must be between {MIN_VALUE} and {MAX_VALUE}."),
                    );
                    None
                }
                None => {
                    errors.add(FIELD, format!("Ingredient amount: {NOT_AN_INTEGER}"));
                    None
                }
            },
        };

        match (ingredient_id, amount) {
            (Some(ingredient_id), Some(amount)) => {
                if !seen.insert(ingredient_id) {
                    errors.add(FIELD, format!("Ingredient {ingredient_id} is listed more than once."));
                    valid = false;
                }
                parsed.push(IngredientAmount { ingredient_id, amount });
            }
            _ => valid = false,
        }
    }
    valid.then_some(parsed)
}

fn parse_tags(value: &Value, errors: &mut FieldErrors) -> Option<Vec<i32>> {
    const FIELD: &str = "tags";
    let items = expect_list(FIELD, value, errors)?;
    if items.is_empty() {
        errors.add(FIELD, "At least one tag is required.");
        return None;
    }

    let mut parsed = Vec::with_capacity(items.len());
    let mut seen = HashSet::new();
    let mut valid = true;
    for item in items {
        match parse_id(item) {
            Some(id) => {
                if !seen.insert(id) {
                    errors.add(FIELD, format!("Tag {id} is listed more than once."));
                    valid = false;
                }
                parsed.push(id);
            }
            None => {
                errors.add(FIELD, format!("Incorrect type. Expected pk value, received {item}."));
                valid = false;
            }
        }
    }
    valid.then_some(parsed)
}
