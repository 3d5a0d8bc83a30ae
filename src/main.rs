//! # Book Tracker Server
//!
//! A small HTTP API for keeping track of the books you are reading, built with
//! Axum and Tokio. Users register, log in for a bearer token and then manage
//! their own reading list.
//!
//! ## Architecture
//! - `server`: application state, route table and server lifecycle
//! - `config`: environment variable configuration
//! - `auth`: password hashing, JWT tokens, ownership guard and middleware
//! - `database`: storage trait with PostgreSQL and in-memory implementations
//! - `routes`: HTTP handlers grouped by resource
//! - `error`: the API error type and its JSON rendering
//!
//! ## Environment Setup
//! Copy `.env.example` to `.env` and set at least `ACCESS_TOKEN_SECRET_KEY`.
//! Set `STORAGE_BACKEND=memory` to run without a database.
//!
//! ## Health Check
//! ```bash
//! curl http://localhost:8000/ping
//! ```

mod auth;
mod config;
mod database;
mod error;
mod routes;
mod server;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact(),
        )
        .init();

    tracing::info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = config::Config::from_env()?;
    server::start(config).await
}
