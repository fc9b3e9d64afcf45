use log::info;
use sqlx::SqlitePool;

use crate::constants::generate_api_token;
use crate::error::{ApiError, Result};
use crate::models::{Role, User};
use crate::queries::users;

/// Resolve a bearer token to its user
pub async fn authenticate(pool: &SqlitePool, token: &str) -> Result<User> {
    if token.is_empty() {
        return Err(ApiError::Unauthorized);
    }
    let row = sqlx::query(&users::select_by_token(token))
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    User::from_row(&row)
}

/// Provision a user with a fresh API token; returns the user and the token
pub async fn create(pool: &SqlitePool, name: &str, role: Role) -> Result<(User, String)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("User name is required".to_string()));
    }
    let token = generate_api_token();
    let result = sqlx::query(&users::insert(name, role.as_str(), &token))
        .execute(pool)
        .await?;
    let user = User {
        id: result.last_insert_rowid(),
        name: name.to_string(),
        role,
    };
    info!("User {} '{}' created with role {}", user.id, user.name, role.as_str());
    Ok((user, token))
}
