use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Select, Set,
};
use tracing::info;

use crate::db::entities::{prelude::User, user};
use crate::db::services::relation_service;
use crate::services::auth_service;
use crate::services::image_codec::decode_data_url;
use crate::services::media_storage::MediaStorage;
use crate::web::error::{AppError, FieldErrors};
use crate::web::form::{Form, NOT_A_STRING, Presence};

pub const AVATAR_DIR: &str = "users";
pub const MAX_NAME_LENGTH: usize = 150;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MIN_PASSWORD_LENGTH: usize = 8;

pub async fn find_user<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<user::Model>, DbErr> {
    User::find_by_id(id).one(db).await
}

pub async fn get_user<C: ConnectionTrait>(db: &C, id: i32) -> Result<user::Model, AppError> {
    find_user(db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("No User matches the given query.".to_string()))
}

pub fn all_users() -> Select<User> {
    User::find().order_by_asc(user::Column::Id)
}

/// Authors followed by `user_id`.
pub fn followed_authors(user_id: i32) -> Select<User> {
    User::find()
        .filter(user::Column::Id.in_subquery(relation_service::followed_author_ids_query(user_id)))
        .order_by_asc(user::Column::Username)
}

fn check_length(field: &str, value: &str, max: usize, errors: &mut FieldErrors) {
    if value.chars().count() > max {
        errors.add(field, format!("Ensure this field has no more than {max} characters."));
    }
}

fn is_valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
}

fn check_password(field: &str, password: &str, errors: &mut FieldErrors) {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            field,
            format!("This password is too short. It must contain at least {MIN_PASSWORD_LENGTH} characters."),
        );
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        errors.add(field, "This password is entirely numeric.");
    }
}

pub async fn register_user(db: &DatabaseConnection, form: &Form) -> Result<user::Model, AppError> {
    let mut errors = FieldErrors::new();
    let email = form
        .text("email", Presence::Required, &mut errors)
        .map(|email| email.to_lowercase());
    let username = form.text("username", Presence::Required, &mut errors);
    let first_name = form.text("first_name", Presence::Required, &mut errors);
    let last_name = form.text("last_name", Presence::Required, &mut errors);
    let password = form.text("password", Presence::Required, &mut errors);

    if let Some(email) = &email {
        check_length("email", email, MAX_EMAIL_LENGTH, &mut errors);
        if !is_valid_email(email) {
            errors.add("email", "Enter a valid email address.");
        } else if User::find().filter(user::Column::Email.eq(email.as_str())).one(db).await?.is_some() {
            errors.add("email", "A user with that email already exists.");
        }
    }
    if let Some(username) = &username {
        check_length("username", username, MAX_NAME_LENGTH, &mut errors);
        if !is_valid_username(username) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        } else if User::find()
            .filter(user::Column::Username.eq(username.as_str()))
            .one(db)
            .await?
            .is_some()
        {
            errors.add("username", "A user with that username already exists.");
        }
    }
    if let Some(first_name) = &first_name {
        check_length("first_name", first_name, MAX_NAME_LENGTH, &mut errors);
    }
    if let Some(last_name) = &last_name {
        check_length("last_name", last_name, MAX_NAME_LENGTH, &mut errors);
    }
    if let Some(password) = &password {
        check_password("password", password, &mut errors);
    }

    let (Some(email), Some(username), Some(first_name), Some(last_name), Some(password)) =
        (email, username, first_name, last_name, password)
    else {
        return Err(errors.into());
    };
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let new_user = user::ActiveModel {
        email: Set(email),
        username: Set(username),
        first_name: Set(first_name),
        last_name: Set(last_name),
        password_hash: Set(auth_service::hash_password(&password)?),
        avatar: Set(None),
        token_version: Set(0),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let created = new_user.insert(db).await?;
    info!(user_id = created.id, username = %created.username, "User registered.");
    Ok(created)
}

pub async fn set_password(db: &DatabaseConnection, user_id: i32, form: &Form) -> Result<(), AppError> {
    let user = get_user(db, user_id).await?;

    let mut errors = FieldErrors::new();
    let current_password = form.text("current_password", Presence::Required, &mut errors);
    let new_password = form.text("new_password", Presence::Required, &mut errors);
    if let Some(current) = &current_password {
        if !auth_service::verify_password(current, &user.password_hash)? {
            errors.add("current_password", "Invalid password.");
        }
    }
    if let Some(new_password) = &new_password {
        check_password("new_password", new_password, &mut errors);
    }
    let Some(new_password) = new_password else {
        return Err(errors.into());
    };
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let mut active = user.into_active_model();
    active.password_hash = Set(auth_service::hash_password(&new_password)?);
    active.update(db).await?;
    info!(user_id, "Password changed.");
    Ok(())
}

/// Stores a new avatar from a data URL and drops the previous one.
pub async fn set_avatar(
    db: &DatabaseConnection,
    media: &MediaStorage,
    user_id: i32,
    form: &Form,
) -> Result<user::Model, AppError> {
    let user = get_user(db, user_id).await?;

    let mut errors = FieldErrors::new();
    let image = match form.value("avatar", Presence::Required, &mut errors) {
        Some(value) => match value.as_str() {
            Some(raw) => decode_data_url(raw)
                .map_err(|e| errors.add("avatar", e.to_string()))
                .ok(),
            None => {
                errors.add("avatar", NOT_A_STRING);
                None
            }
        },
        None => None,
    };
    let Some(image) = image else {
        return Err(errors.into());
    };

    let path = media.save(AVATAR_DIR, &image).await?;
    let previous = user.avatar.clone();
    let mut active = user.into_active_model();
    active.avatar = Set(Some(path.clone()));
    let updated = match active.update(db).await {
        Ok(updated) => updated,
        Err(e) => {
            media.remove(&path).await;
            return Err(e.into());
        }
    };

    if let Some(previous) = previous {
        media.remove(&previous).await;
    }
    info!(user_id, "Avatar updated.");
    Ok(updated)
}

pub async fn clear_avatar(db: &DatabaseConnection, media: &MediaStorage, user_id: i32) -> Result<(), AppError> {
    let user = get_user(db, user_id).await?;
    let Some(previous) = user.avatar.clone() else {
        return Ok(());
    };
    let mut active = user.into_active_model();
    active.avatar = Set(None);
    active.update(db).await?;
    media.remove(&previous).await;
    info!(user_id, "Avatar removed.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::services::relation_service::{SubscriptionRelation, add};
    use crate::db::test_support;
    use crate::services::image_codec::tests::png_data_url;
    use serde_json::{Value, json};

    fn form(value: Value) -> Form {
        Form::from_value(value).unwrap()
    }

    fn registration() -> Value {
        json!({
            "email": "Vasya@Example.com",
            "username": "vasya.pupkin",
            "first_name": "Vasya",
            "last_name": "Pupkin",
            "password": "Qwerty123",
        })
    }

    #[tokio::test]
    async fn test_register_hashes_password_and_normalizes_email() {
        let db = test_support::setup().await;
        let user = register_user(&db, &form(registration())).await.unwrap();
        assert_eq!(user.email, "vasya@example.com");
        assert_ne!(user.password_hash, "Qwerty123");
        assert!(auth_service::verify_password("Qwerty123", &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let db = test_support::setup().await;
        register_user(&db, &form(registration())).await.unwrap();

        match register_user(&db, &form(registration())).await {
            Err(AppError::Validation(errors)) => {
                assert!(errors.contains("email"));
                assert!(errors.contains("username"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_field_rules() {
        let db = test_support::setup().await;
        let body = json!({
            "email": "not-an-email",
            "username": "bad name!",
            "first_name": "x".repeat(151),
            "password": "1234",
        });
        match register_user(&db, &form(body)).await {
            Err(AppError::Validation(errors)) => {
                for field in ["email", "username", "first_name", "last_name", "password"] {
                    assert!(errors.contains(field), "{field}");
                }
                assert_eq!(errors.messages("password").len(), 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_set_password_checks_current_password() {
        let db = test_support::setup().await;
        let user = register_user(&db, &form(registration())).await.unwrap();

        let wrong = json!({ "current_password": "nope", "new_password": "NewPass456" });
        assert!(matches!(
            set_password(&db, user.id, &form(wrong)).await,
            Err(AppError::Validation(ref e)) if e.contains("current_password")
        ));

        let right = json!({ "current_password": "Qwerty123", "new_password": "NewPass456" });
        set_password(&db, user.id, &form(right)).await.unwrap();
        let reloaded = get_user(&db, user.id).await.unwrap();
        assert!(auth_service::verify_password("NewPass456", &reloaded.password_hash).unwrap());
    }

    #[tokio::test]
    async fn test_avatar_roundtrip() {
        let db = test_support::setup().await;
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStorage::new(dir.path());
        let user = test_support::user(&db, "alice").await;

        let first = set_avatar(&db, &media, user.id, &form(json!({ "avatar": png_data_url() })))
            .await
            .unwrap()
            .avatar
            .unwrap();
        let second = set_avatar(&db, &media, user.id, &form(json!({ "avatar": png_data_url() })))
            .await
            .unwrap()
            .avatar
            .unwrap();
        assert!(!dir.path().join(&first).exists());
        assert!(dir.path().join(&second).exists());

        clear_avatar(&db, &media, user.id).await.unwrap();
        assert!(!dir.path().join(&second).exists());
        assert_eq!(get_user(&db, user.id).await.unwrap().avatar, None);

        let missing = set_avatar(&db, &media, user.id, &form(json!({}))).await;
        assert!(matches!(missing, Err(AppError::Validation(ref e)) if e.contains("avatar")));
    }

    #[tokio::test]
    async fn test_followed_authors() {
        let db = test_support::setup().await;
        let alice = test_support::user(&db, "alice").await;
        let bob = test_support::user(&db, "bob").await;
        let carol = test_support::user(&db, "carol").await;
        add::<SubscriptionRelation>(&db, alice.id, carol.id).await.unwrap();
        add::<SubscriptionRelation>(&db, alice.id, bob.id).await.unwrap();

        let names: Vec<String> = followed_authors(alice.id)
            .all(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, ["bob", "carol"]);
        assert!(followed_authors(bob.id).all(&db).await.unwrap().is_empty());
    }
}
