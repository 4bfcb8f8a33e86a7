//! The `services` module provides the data access layer. Handlers call into these modules
//! instead of building queries themselves.
//!
//! Each sub-module covers one area: the catalogue (ingredients and tags), users, recipe
//! writes, recipe reads, the favorite/cart/subscription relations and the shopping list.

pub mod ingredient_service;
pub mod recipe_query_service;
pub mod recipe_service;
pub mod relation_service;
pub mod shopping_list_service;
pub mod tag_service;
pub mod user_service;
