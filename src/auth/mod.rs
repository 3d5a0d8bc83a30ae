//! # Authentication Module
//!
//! Password hashing, JWT issuance and validation, ownership checks, and the
//! middleware that turns a bearer token into an [`models::AuthUser`].

pub mod guard;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;

pub use guard::authorize;
pub use jwt::TokenService;
pub use models::AuthUser;
pub use password::{HashCost, PasswordService};
