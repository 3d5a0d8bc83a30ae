//! # Book Routes
//!
//! CRUD over the caller's reading list. Books are always created for the
//! caller; other users' books are never visible.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::auth::AuthUser;
use crate::database::models::{Book, BookChanges, NewBook};
use crate::error::ApiError;
use crate::routes::{ensure_owner, parse_id};
use crate::server::AppState;

/// Loads the book behind `raw_id`, checking existence before ownership.
async fn owned_book(
    state: &AppState,
    caller: &AuthUser,
    raw_id: &str,
    denied: &'static str,
) -> Result<Book, ApiError> {
    let id = parse_id(raw_id, "invalid book id")?;
    let book = state
        .store
        .get_book(id)
        .await?
        .ok_or(ApiError::NotFound("book not found"))?;
    ensure_owner(caller, book.owner_id, denied)?;
    Ok(book)
}

/// `POST /books/`
pub async fn create_book(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    payload: Result<Json<NewBook>, JsonRejection>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    let Json(new_book) = payload?;
    new_book.validate()?;

    let book = state.store.create_book(caller.id, new_book).await?;
    tracing::info!("User {} added book {}", caller.id, book.id);
    Ok((StatusCode::CREATED, Json(book)))
}

/// `GET /books/`
pub async fn list_books(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<Book>>, ApiError> {
    Ok(Json(state.store.list_books(caller.id).await?))
}

/// `GET /books/{id}`
pub async fn get_book(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Book>, ApiError> {
    let book = owned_book(&state, &caller, &id, "you cannot view this book").await?;
    Ok(Json(book))
}

/// `PATCH /books/{id}`: merges the supplied fields and re-validates the result
pub async fn update_book(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<BookChanges>, JsonRejection>,
) -> Result<Json<Book>, ApiError> {
    let book = owned_book(&state, &caller, &id, "you cannot update this book").await?;
    let Json(changes) = payload?;

    // Stored as a whole record, never as a partial patch.
    let mut merged = book;
    merged.apply(changes);
    merged.validate()?;

    let updated = state
        .store
        .update_book(&merged)
        .await?
        .ok_or(ApiError::NotFound("book not found"))?;
    Ok(Json(updated))
}

/// `DELETE /books/{id}`
pub async fn delete_book(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let book = owned_book(&state, &caller, &id, "you cannot delete this book").await?;

    if !state.store.delete_book(book.id).await? {
        return Err(ApiError::NotFound("book not found"));
    }

    tracing::info!("User {} deleted book {}", caller.id, book.id);
    Ok(StatusCode::NO_CONTENT)
}
