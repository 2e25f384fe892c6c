use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::crypto::hash_password;
use crate::db::{Company, CreateUserRequest, NewUser, UserResponse};
use crate::AppState;

use super::auth::CurrentUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_password, validate_username};

/// List all users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let runtime = state.runtime().ok_or_else(ApiError::not_installed)?;
    let users = runtime.db.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Get a single user by ID
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    let runtime = state.runtime().ok_or_else(ApiError::not_installed)?;
    let user = runtime
        .db
        .find_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user.into()))
}

/// Create a user. Only admins may do this.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    if !current.claims.is_admin {
        return Err(ApiError::forbidden("Only administrators can create users"));
    }

    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(req.email.trim()));
    errors.check("username", validate_username(&req.username));
    errors.check("password", validate_password(&req.password));
    errors.finish()?;

    let runtime = state.runtime().ok_or_else(ApiError::not_installed)?;

    let password_hash = hash_password(&req.password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to hash password")
    })?;

    let id = runtime
        .db
        .create_user(&NewUser {
            first_name: req.first_name.trim(),
            last_name: req.last_name.trim(),
            email: req.email.trim(),
            username: req.username.trim(),
            password_hash: &password_hash,
            is_admin: req.is_admin,
        })
        .await?;

    tracing::info!(user_id = id, created_by = current.id, "User created");

    let user = runtime
        .db
        .find_user(id)
        .await?
        .ok_or_else(|| ApiError::internal("Created user could not be read back"))?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Company details recorded during installation
pub async fn get_company(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Company>, ApiError> {
    let runtime = state.runtime().ok_or_else(ApiError::not_installed)?;
    let company = runtime
        .db
        .find_company()
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;
    Ok(Json(company))
}
