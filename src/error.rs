//! API errors
//!
//! Handlers return `Result<_, ApiError>`. The variant picks the status code and
//! the body is always `{"error": "<message>"}`. Internal failures are logged
//! where they are converted and reach the client only as a fixed message.

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::database::models::ValidationError;
use crate::database::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing client input
    #[error("{0}")]
    Validation(String),
    /// Missing, invalid or expired access token
    #[error("{0}")]
    Unauthenticated(&'static str),
    /// Login with an unknown email or a wrong password
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    NotFound(&'static str),
    /// The record exists but belongs to someone else
    #[error("{0}")]
    NotOwner(&'static str),
    #[error("{0}")]
    Internal(&'static str),
}

impl ApiError {
    /// Log `err` and hide it behind `message`.
    pub fn internal(message: &'static str, err: impl std::fmt::Display) -> Self {
        tracing::error!("{}: {}", message, err);
        ApiError::Internal(message)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) | ApiError::NotOwner(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidCredentials => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(field) => ApiError::Validation(format!("{} is taken", field)),
            other => ApiError::internal("database error", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthenticated("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotOwner("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Internal("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_conflict_becomes_validation() {
        let err = ApiError::from(StoreError::Conflict("email"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "email is taken");
    }
}
