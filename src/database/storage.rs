// Storage interface
//
// Everything the handlers need from persistence. Lookups that find nothing
// return `Ok(None)` / `Ok(false)`; errors are reserved for real failures.

use async_trait::async_trait;
use thiserror::Error;

use crate::database::models::{Book, NewBook, NewUser, User, UserChanges, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write. The payload names the column.
    #[error("{0} is already in use")]
    Conflict(&'static str),
    #[error("failed to get database connection: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("database query failed: {0}")]
    Query(#[from] tokio_postgres::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Returns `None` when the user no longer exists.
    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<Option<User>>;
    /// Deletes the user and every book they own. `false` if there was no such user.
    async fn delete_user(&self, id: UserId) -> StoreResult<bool>;

    async fn create_book(&self, owner: UserId, book: NewBook) -> StoreResult<Book>;
    async fn list_books(&self, owner: UserId) -> StoreResult<Vec<Book>>;
    async fn get_book(&self, id: i32) -> StoreResult<Option<Book>>;
    /// Overwrites the stored book with `book`, matched by `book.id`.
    async fn update_book(&self, book: &Book) -> StoreResult<Option<Book>>;
    async fn delete_book(&self, id: i32) -> StoreResult<bool>;

    async fn health_check(&self) -> StoreResult<()>;

    async fn is_email_taken(&self, email: &str) -> StoreResult<bool> {
        Ok(self.get_user_by_email(email).await?.is_some())
    }
}
