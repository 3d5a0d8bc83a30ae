// In-memory storage
//
// Same contract as the PostgreSQL store: unique emails, ids assigned in
// insertion order, and a user's books removed with the user. Used by the tests
// and by `STORAGE_BACKEND=memory` for local runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::database::models::{Book, NewBook, NewUser, User, UserChanges, UserId};
use crate::database::storage::{Storage, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    books: BTreeMap<i32, Book>,
    last_user_id: i32,
    last_book_id: i32,
}

impl Tables {
    fn email_owner(&self, email: &str) -> Option<UserId> {
        self.users
            .values()
            .find(|user| user.email == email)
            .map(|user| user.id)
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write();
        if tables.email_owner(&user.email).is_some() {
            return Err(StoreError::Conflict("email"));
        }
        tables.last_user_id += 1;
        let now = Utc::now();
        let created = User {
            id: UserId(tables.last_user_id),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id.0, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.tables.read().users.get(&id.0).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read();
        Ok(tables
            .email_owner(email)
            .and_then(|id| tables.users.get(&id.0).cloned()))
    }

    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write();
        if let Some(email) = &changes.email {
            if tables.email_owner(email).is_some_and(|owner| owner != id) {
                return Err(StoreError::Conflict("email"));
            }
        }
        let Some(user) = tables.users.get_mut(&id.0) else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(password_hash) = changes.password_hash {
            user.password_hash = password_hash;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        if tables.users.remove(&id.0).is_none() {
            return Ok(false);
        }
        tables.books.retain(|_, book| book.owner_id != id);
        Ok(true)
    }

    async fn create_book(&self, owner: UserId, book: NewBook) -> StoreResult<Book> {
        let mut tables = self.tables.write();
        tables.last_book_id += 1;
        let now = Utc::now();
        let created = Book {
            id: tables.last_book_id,
            title: book.title,
            author: book.author,
            edition: book.edition,
            pages_count: book.pages_count,
            pages_read: book.pages_read,
            owner_id: owner,
            created_at: now,
            updated_at: now,
        };
        tables.books.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_books(&self, owner: UserId) -> StoreResult<Vec<Book>> {
        Ok(self
            .tables
            .read()
            .books
            .values()
            .filter(|book| book.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn get_book(&self, id: i32) -> StoreResult<Option<Book>> {
        Ok(self.tables.read().books.get(&id).cloned())
    }

    async fn update_book(&self, book: &Book) -> StoreResult<Option<Book>> {
        let mut tables = self.tables.write();
        let Some(stored) = tables.books.get_mut(&book.id) else {
            return Ok(None);
        };
        stored.title = book.title.clone();
        stored.author = book.author.clone();
        stored.edition = book.edition;
        stored.pages_count = book.pages_count;
        stored.pages_read = book.pages_read;
        stored.updated_at = Utc::now();
        Ok(Some(stored.clone()))
    }

    async fn delete_book(&self, id: i32) -> StoreResult<bool> {
        Ok(self.tables.write().books.remove(&id).is_some())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
