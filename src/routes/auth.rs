//! Auth routes for registration and login

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Json, Router};

use crate::auth::models::{LoginForm, RegisterRequest, TokenResponse};
use crate::database::models::{normalize_email, require, validate_email, NewUser, User};
use crate::error::ApiError;
use crate::server::AppState;

/// Hash on the blocking pool; argon2 is deliberately slow.
pub(crate) async fn hash_password(state: &AppState, plaintext: String) -> Result<String, ApiError> {
    let passwords = state.passwords.clone();
    tokio::task::spawn_blocking(move || passwords.hash(&plaintext))
        .await
        .map_err(|e| ApiError::internal("failed to hash password", e))?
        .map_err(|e| ApiError::internal("failed to hash password", e))
}

/// Verify on the blocking pool. `None` for the stored hash runs a dummy
/// verification and always fails.
async fn verify_password(
    state: &AppState,
    plaintext: String,
    stored_hash: Option<String>,
) -> Result<bool, ApiError> {
    let passwords = state.passwords.clone();
    tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => passwords.verify(&plaintext, &hash),
        None => {
            passwords.verify_dummy(&plaintext);
            Ok(false)
        }
    })
    .await
    .map_err(|e| ApiError::internal("failed to verify password", e))?
    .map_err(|e| ApiError::internal("failed to verify password", e))
}

/// `POST /auth/register`
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(payload) = payload?;

    require("username", &payload.username)?;
    let email = normalize_email(&payload.email);
    validate_email(&email)?;
    require("password", &payload.password)?;

    if state.store.is_email_taken(&email).await? {
        return Err(ApiError::Validation("email is taken".to_string()));
    }

    let password_hash = hash_password(&state, payload.password).await?;
    let user = state
        .store
        .create_user(NewUser {
            username: payload.username.trim().to_string(),
            email,
            password_hash,
        })
        .await?;

    tracing::info!("Registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /auth/login`, form-encoded `username` (the email) and `password`
pub async fn login(
    State(state): State<AppState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Form(form) = form?;

    require("username", &form.username)?;
    require("password", &form.password)?;

    let email = normalize_email(&form.username);
    let user = state.store.get_user_by_email(&email).await?;
    let stored_hash = user.as_ref().map(|u| u.password_hash.clone());

    // Unknown email and wrong password must be indistinguishable.
    let verified = verify_password(&state, form.password, stored_hash).await?;
    let user = match user {
        Some(user) if verified => user,
        _ => {
            tracing::info!("Rejected login attempt");
            return Err(ApiError::InvalidCredentials);
        }
    };

    let access_token = state
        .tokens
        .issue(user.id)
        .map_err(|e| ApiError::internal("failed to generate access token", e))?;

    tracing::info!("User {} logged in", user.id);
    Ok(Json(TokenResponse::new(
        access_token,
        state.tokens.ttl().num_seconds(),
    )))
}

pub fn create_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}
