//! Authentication Middleware
//!
//! Axum middleware for JWT token validation and user authentication.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::auth::models::AuthUser;
use crate::error::ApiError;
use crate::server::AppState;

/// Authentication middleware that validates JWT tokens and injects user info
pub struct AuthMiddleware;

impl AuthMiddleware {
    /// Rejects the request with 401 unless it carries a valid bearer token for
    /// a user that still exists. On success the handler can extract
    /// `Extension<AuthUser>`.
    pub async fn validate_token(
        State(state): State<AppState>,
        mut req: Request,
        next: Next,
    ) -> Result<Response, ApiError> {
        let user_id = {
            let token = bearer_token(req.headers()).ok_or_else(|| {
                tracing::debug!("[AuthMiddleware] Missing bearer token for {} {}", req.method(), req.uri());
                ApiError::Unauthenticated("access token required")
            })?;
            state.tokens.validate(token).map_err(|e| {
                tracing::warn!("[AuthMiddleware] JWT validation failed: {}", e);
                ApiError::Unauthenticated("invalid access token")
            })?
        };

        let user = state.store.get_user(user_id).await?.ok_or_else(|| {
            tracing::warn!("[AuthMiddleware] Token subject {} no longer exists", user_id);
            ApiError::Unauthenticated("invalid access token")
        })?;

        req.extensions_mut().insert(AuthUser {
            id: user.id,
            email: user.email,
        });

        Ok(next.run(req).await)
    }
}

/// The token from an `Authorization: Bearer <token>` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
