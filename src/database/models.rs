// Database Models
//
// Users and books as they are stored, plus the validated inputs used to create
// and change them.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_postgres::Row;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern compiles")
});

/// Trait for converting from tokio-postgres Row
pub trait FromRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error>
    where
        Self: Sized;
}

/// Identity of a registered user. Assigned by storage at registration and never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(UserId)
    }
}

/// Rejected client input. The message is safe to return to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("email is invalid")]
    InvalidEmail,
    #[error("invalid pages count")]
    InvalidPagesCount,
    #[error("invalid pages read")]
    InvalidPagesRead,
}

/// Fails with `Required(field)` when `value` is empty after trimming.
pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    require("email", email)?;
    if !EMAIL_PATTERN.is_match(email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

/// Emails are compared and stored trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_pages(pages_count: i32, pages_read: i32) -> Result<(), ValidationError> {
    if pages_count <= 0 {
        return Err(ValidationError::InvalidPagesCount);
    }
    if pages_read < 0 || pages_read > pages_count {
        return Err(ValidationError::InvalidPagesRead);
    }
    Ok(())
}

// ============================================================================
// USERS
// ============================================================================

/// User account information
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow for User {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: UserId(row.try_get("id")?),
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// A user together with the books they own, as returned by `GET /users/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub books: Vec<Book>,
}

/// A user ready to be inserted. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Partial update of a user. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

// ============================================================================
// BOOKS
// ============================================================================

/// A book on a user's reading list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edition: Option<i32>,
    pub pages_count: i32,
    pub pages_read: i32,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow for Book {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            edition: row.try_get("edition")?,
            pages_count: row.try_get("pages_count")?,
            pages_read: row.try_get("pages_read")?,
            owner_id: UserId(row.try_get("owner_id")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Book {
    /// Overwrites every field present in `changes`.
    pub fn apply(&mut self, changes: BookChanges) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(author) = changes.author {
            self.author = author;
        }
        if let Some(edition) = changes.edition {
            self.edition = Some(edition);
        }
        if let Some(pages_count) = changes.pages_count {
            self.pages_count = pages_count;
        }
        if let Some(pages_read) = changes.pages_read {
            self.pages_read = pages_read;
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("title", &self.title)?;
        require("author", &self.author)?;
        validate_pages(self.pages_count, self.pages_read)
    }
}

/// Body of `POST /books/`. Missing numbers default to zero and fail validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub edition: Option<i32>,
    pub pages_count: i32,
    pub pages_read: i32,
}

impl NewBook {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("title", &self.title)?;
        require("author", &self.author)?;
        validate_pages(self.pages_count, self.pages_read)
    }
}

/// Body of `PATCH /books/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookChanges {
    pub title: Option<String>,
    pub author: Option<String>,
    pub edition: Option<i32>,
    pub pages_count: Option<i32>,
    pub pages_read: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(pages_count: i32, pages_read: i32) -> NewBook {
        NewBook {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            edition: None,
            pages_count,
            pages_read,
        }
    }

    fn stored_book() -> Book {
        let now = Utc::now();
        Book {
            id: 7,
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            edition: Some(2),
            pages_count: 500,
            pages_read: 100,
            owner_id: UserId(1),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_book_page_bounds() {
        assert_eq!(book(500, 0).validate(), Ok(()));
        assert_eq!(book(500, 500).validate(), Ok(()));
        assert_eq!(book(500, 1000).validate(), Err(ValidationError::InvalidPagesRead));
        assert_eq!(book(500, -1).validate(), Err(ValidationError::InvalidPagesRead));
        assert_eq!(book(0, 0).validate(), Err(ValidationError::InvalidPagesCount));
    }

    #[test]
    fn test_book_requires_title_and_author() {
        let mut missing_title = book(10, 1);
        missing_title.title = "   ".to_string();
        assert_eq!(missing_title.validate(), Err(ValidationError::Required("title")));

        let mut missing_author = book(10, 1);
        missing_author.author.clear();
        assert_eq!(missing_author.validate(), Err(ValidationError::Required("author")));
    }

    #[test]
    fn test_apply_merges_and_revalidates() {
        let mut book = stored_book();
        book.apply(BookChanges {
            pages_read: Some(250),
            ..Default::default()
        });
        assert_eq!(book.pages_read, 250);
        assert_eq!(book.title, "Dune");
        assert_eq!(book.edition, Some(2));
        assert!(book.validate().is_ok());

        book.apply(BookChanges {
            pages_count: Some(200),
            ..Default::default()
        });
        assert_eq!(book.validate(), Err(ValidationError::InvalidPagesRead));
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("foo@bar.com").is_ok());
        assert_eq!(validate_email("foo"), Err(ValidationError::InvalidEmail));
        assert_eq!(validate_email("foo@bar"), Err(ValidationError::InvalidEmail));
        assert_eq!(validate_email(""), Err(ValidationError::Required("email")));
        assert_eq!(normalize_email("  Foo@Bar.COM "), "foo@bar.com");
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let now = Utc::now();
        let user = User {
            id: UserId(1),
            username: "foo".to_string(),
            email: "foo@bar.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["id"], 1);
    }

    #[test]
    fn test_user_id_parsing() {
        assert_eq!("42".parse::<UserId>(), Ok(UserId(42)));
        assert!("abc".parse::<UserId>().is_err());
        assert_eq!(UserId(3).to_string(), "3");
    }
}
