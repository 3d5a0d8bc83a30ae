//! # Database Module
//!
//! Persistence for users and books: the `Storage` interface, a PostgreSQL
//! implementation over a deadpool connection pool, and an in-memory one.

pub mod connection;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod postgres;
pub mod storage;

pub use connection::{DatabaseConfig, DatabaseConnection};
pub use memory::MemoryStorage;
pub use storage::{Storage, StoreError};
