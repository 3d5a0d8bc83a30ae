//! # User Routes
//!
//! A caller can read, change and delete only their own account.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::database::models::{
    normalize_email, require, validate_email, User, UserChanges, UserId, UserProfile,
};
use crate::error::ApiError;
use crate::routes::auth::hash_password;
use crate::routes::{ensure_owner, parse_id};
use crate::server::AppState;

/// Body of `PATCH /users/{id}`. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Loads the user behind `raw_id`, checking existence before ownership.
async fn owned_user(
    state: &AppState,
    caller: &AuthUser,
    raw_id: &str,
    denied: &'static str,
) -> Result<User, ApiError> {
    let id = UserId(parse_id(raw_id, "invalid user id")?);
    let user = state
        .store
        .get_user(id)
        .await?
        .ok_or(ApiError::NotFound("user not found"))?;
    ensure_owner(caller, user.id, denied)?;
    Ok(user)
}

/// `GET /users/{id}`: the user and their books
pub async fn get_user(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = owned_user(&state, &caller, &id, "you cannot view this user").await?;
    let books = state.store.list_books(user.id).await?;
    Ok(Json(UserProfile { user, books }))
}

/// `PATCH /users/{id}`
pub async fn update_user(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let user = owned_user(&state, &caller, &id, "you cannot update this user").await?;
    let Json(payload) = payload?;

    let mut changes = UserChanges::default();

    if let Some(username) = payload.username {
        require("username", &username)?;
        changes.username = Some(username.trim().to_string());
    }

    if let Some(email) = payload.email {
        let email = normalize_email(&email);
        validate_email(&email)?;
        if email != user.email && state.store.is_email_taken(&email).await? {
            return Err(ApiError::Validation("email is taken".to_string()));
        }
        changes.email = Some(email);
    }

    if let Some(password) = payload.password {
        require("password", &password)?;
        changes.password_hash = Some(hash_password(&state, password).await?);
    }

    let updated = state
        .store
        .update_user(user.id, changes)
        .await?
        .ok_or(ApiError::NotFound("user not found"))?;

    tracing::info!("Updated user {}", updated.id);
    Ok(Json(updated))
}

/// `DELETE /users/{id}`: removes the account and all of its books
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user = owned_user(&state, &caller, &id, "you cannot delete this user").await?;

    if !state.store.delete_user(user.id).await? {
        return Err(ApiError::NotFound("user not found"));
    }

    tracing::info!("Deleted user {}", user.id);
    Ok(StatusCode::NO_CONTENT)
}
