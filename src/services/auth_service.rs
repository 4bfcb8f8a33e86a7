use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use tracing::{info, warn};

use crate::db::entities::user;
use crate::server::config::ServerConfig;
use crate::web::error::{AppError, FieldErrors};
use crate::web::form::{Form, Presence};
use crate::web::models::{AuthenticatedUser, Claims};

pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, DEFAULT_COST).map_err(|e| AppError::PasswordHashingError(e.to_string()))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    verify(password, password_hash)
        .map_err(|e| AppError::InternalServerError(format!("Password verification failed: {e}")))
}

pub fn create_token(user: &user::Model, jwt_secret: &str, ttl_hours: i64) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.username.clone(),
        user_id: user.id,
        ver: user.token_version,
        exp: (now + Duration::hours(ttl_hours)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_ref()))
        .map_err(|e| AppError::TokenCreationError(e.to_string()))
}

/// Resolves a bearer token to the user it was issued for. Expired, forged and revoked tokens
/// as well as tokens of deleted users are all rejected the same way.
pub async fn authenticate_token(
    db: &DatabaseConnection,
    token: &str,
    jwt_secret: &str,
) -> Result<AuthenticatedUser, AppError> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|e| {
        warn!(error = ?e, "Rejected malformed or expired token.");
        AppError::Unauthorized("Invalid token.".to_string())
    })?
    .claims;

    let user = user::Entity::find_by_id(claims.user_id)
        .one(db)
        .await?
        .filter(|user| user.token_version == claims.ver)
        .ok_or_else(|| {
            warn!(user_id = claims.user_id, "Rejected token of a missing user or a revoked session.");
            AppError::Unauthorized("Invalid token.".to_string())
        })?;

    Ok(AuthenticatedUser {
        id: user.id,
        username: user.username,
    })
}

/// Email and password login. Returns the issued token.
pub async fn login(db: &DatabaseConnection, form: &Form, config: &ServerConfig) -> Result<String, AppError> {
    let mut errors = FieldErrors::new();
    let email = form.text("email", Presence::Required, &mut errors);
    let password = form.text("password", Presence::Required, &mut errors);
    let (Some(email), Some(password)) = (email, password) else {
        return Err(errors.into());
    };

    let user = user::Entity::find()
        .filter(user::Column::Email.eq(email.to_lowercase()))
        .one(db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&password, &user.password_hash)? {
        warn!(user_id = user.id, "Login attempt with a wrong password.");
        return Err(AppError::InvalidCredentials);
    }

    info!(user_id = user.id, "User logged in.");
    create_token(&user, &config.jwt_secret, config.token_ttl_hours)
}

/// Revokes every token issued to the user so far.
pub async fn logout(db: &DatabaseConnection, user_id: i32) -> Result<(), AppError> {
    let user = user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid token.".to_string()))?;
    let next_version = user.token_version.wrapping_add(1);
    let mut active = user.into_active_model();
    active.token_version = Set(next_version);
    active.update(db).await?;
    info!(user_id, "User logged out.");
    Ok(())
}
