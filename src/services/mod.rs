pub mod auth_service;
pub mod image_codec;
pub mod media_storage;
pub mod recipe_validator;
pub mod short_link;
