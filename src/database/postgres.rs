// PostgreSQL storage
//
// `Storage` implemented on the pooled connection. Every query opens its own
// pooled client; nothing is held across requests.

use async_trait::async_trait;
use tokio_postgres::error::SqlState;

use crate::database::connection::DatabaseConnection;
use crate::database::models::{
    Book, FromRow, NewBook, NewUser, User, UserChanges, UserId,
};
use crate::database::storage::{Storage, StoreError, StoreResult};

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, updated_at";
const BOOK_COLUMNS: &str =
    "id, title, author, edition, pages_count, pages_read, owner_id, created_at, updated_at";

/// Maps a unique violation on `users.email` to `StoreError::Conflict`.
fn email_conflict(err: tokio_postgres::Error) -> StoreError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        StoreError::Conflict("email")
    } else {
        StoreError::Query(err)
    }
}

#[async_trait]
impl Storage for DatabaseConnection {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let client = self.pool().get().await?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) RETURNING {}",
                    USER_COLUMNS
                ),
                &[&user.username, &user.email, &user.password_hash],
            )
            .await
            .map_err(email_conflict)?;
        Ok(User::from_row(&row)?)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let client = self.pool().get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS),
                &[&id.0],
            )
            .await?;
        Ok(row.map(|r| User::from_row(&r)).transpose()?)
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let client = self.pool().get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS),
                &[&email],
            )
            .await?;
        Ok(row.map(|r| User::from_row(&r)).transpose()?)
    }

    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<Option<User>> {
        let client = self.pool().get().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE users SET \
                        username = COALESCE($2, username), \
                        email = COALESCE($3, email), \
                        password_hash = COALESCE($4, password_hash), \
                        updated_at = NOW() \
                     WHERE id = $1 RETURNING {}",
                    USER_COLUMNS
                ),
                &[&id.0, &changes.username, &changes.email, &changes.password_hash],
            )
            .await
            .map_err(email_conflict)?;
        Ok(row.map(|r| User::from_row(&r)).transpose()?)
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<bool> {
        let client = self.pool().get().await?;
        // books.owner_id cascades
        let deleted = client
            .execute("DELETE FROM users WHERE id = $1", &[&id.0])
            .await?;
        Ok(deleted > 0)
    }

    async fn create_book(&self, owner: UserId, book: NewBook) -> StoreResult<Book> {
        let client = self.pool().get().await?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO books (title, author, edition, pages_count, pages_read, owner_id) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
                    BOOK_COLUMNS
                ),
                &[
                    &book.title,
                    &book.author,
                    &book.edition,
                    &book.pages_count,
                    &book.pages_read,
                    &owner.0,
                ],
            )
            .await?;
        Ok(Book::from_row(&row)?)
    }

    async fn list_books(&self, owner: UserId) -> StoreResult<Vec<Book>> {
        let client = self.pool().get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM books WHERE owner_id = $1 ORDER BY id",
                    BOOK_COLUMNS
                ),
                &[&owner.0],
            )
            .await?;
        Ok(rows
            .iter()
            .map(Book::from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_book(&self, id: i32) -> StoreResult<Option<Book>> {
        let client = self.pool().get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS),
                &[&id],
            )
            .await?;
        Ok(row.map(|r| Book::from_row(&r)).transpose()?)
    }

    async fn update_book(&self, book: &Book) -> StoreResult<Option<Book>> {
        let client = self.pool().get().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE books SET \
                        title = $2, \
                        author = $3, \
                        edition = $4, \
                        pages_count = $5, \
                        pages_read = $6, \
                        updated_at = NOW() \
                     WHERE id = $1 RETURNING {}",
                    BOOK_COLUMNS
                ),
                &[
                    &book.id,
                    &book.title,
                    &book.author,
                    &book.edition,
                    &book.pages_count,
                    &book.pages_read,
                ],
            )
            .await?;
        Ok(row.map(|r| Book::from_row(&r)).transpose()?)
    }

    async fn delete_book(&self, id: i32) -> StoreResult<bool> {
        let client = self.pool().get().await?;
        let deleted = client
            .execute("DELETE FROM books WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }

    async fn health_check(&self) -> StoreResult<()> {
        let client = self.pool().get().await?;
        client.query("SELECT 1", &[]).await?;
        Ok(())
    }
}
