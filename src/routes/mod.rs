// # Routes Module
//
// HTTP route handlers, grouped by resource:
// - `health`: liveness and storage checks
// - `auth`: registration and login
// - `users`: a caller's own profile
// - `books`: a caller's reading list
//
// Every handler under `users` and `books` runs behind `AuthMiddleware` and
// follows the same order: parse the id (400), load the record (404), check
// ownership (401), then act.

use crate::auth::{authorize, AuthUser};
use crate::database::models::UserId;
use crate::error::ApiError;

pub mod auth;
pub mod books;
pub mod health;
pub mod users;

/// Parses a path id, failing with 400 and `message`.
pub(crate) fn parse_id(raw: &str, message: &'static str) -> Result<i32, ApiError> {
    raw.parse::<i32>()
        .map_err(|_| ApiError::Validation(message.to_string()))
}

/// Fails with 401 and `message` unless `caller` owns the record.
pub(crate) fn ensure_owner(
    caller: &AuthUser,
    owner: UserId,
    message: &'static str,
) -> Result<(), ApiError> {
    if authorize(caller.id, owner).is_allowed() {
        Ok(())
    } else {
        tracing::warn!("User {} denied access to a record owned by {}", caller.id, owner);
        Err(ApiError::NotOwner(message))
    }
}
