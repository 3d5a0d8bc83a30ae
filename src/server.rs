//! # Server Module
//!
//! Application state, route table and the HTTP server lifecycle.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::middleware::AuthMiddleware;
use crate::auth::{PasswordService, TokenService};
use crate::config::{Config, StorageBackend};
use crate::database::migrations::run_migrations;
use crate::database::{DatabaseConnection, MemoryStorage, Storage};
use crate::routes::{auth, books, health, users};

/// Application state shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub passwords: Arc<PasswordService>,
    pub store: Arc<dyn Storage>,
}

impl AppState {
    pub fn new(tokens: TokenService, passwords: PasswordService, store: Arc<dyn Storage>) -> Self {
        Self {
            tokens: Arc::new(tokens),
            passwords: Arc::new(passwords),
            store,
        }
    }
}

/// CORS policy. An empty list allows any origin, without credentials.
pub fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::AUTHORIZATION, header::CONTENT_TYPE]);

    if allowed_origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }

    let origins = allowed_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin '{}'", origin))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(origins))
}

/// The full route table. Everything under `/users` and `/books` requires a
/// bearer token.
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    let protected = Router::new()
        .route(
            "/users/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/", get(books::list_books).post(books::create_book))
        .route(
            "/books/{id}",
            get(books::get_book)
                .patch(books::update_book)
                .delete(books::delete_book),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            AuthMiddleware::validate_token,
        ));

    Router::new()
        .route("/ping", get(health::ping))
        .route("/health", get(health::health))
        .merge(auth::create_auth_routes())
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the book tracker HTTP server and runs until Ctrl+C.
pub async fn start(config: Config) -> Result<()> {
    let tokens = TokenService::new(&config.auth.token_secret, config.auth.token_ttl)
        .context("Failed to initialize token service")?;
    let passwords = PasswordService::new(config.auth.hash_cost)
        .context("Failed to initialize password hasher")?;

    let store: Arc<dyn Storage> = match config.storage {
        StorageBackend::Postgres => {
            let db = DatabaseConnection::new(config.database.clone())
                .await
                .context("Failed to connect to database")?;
            run_migrations(db.pool())
                .await
                .context("Failed to apply database migrations")?;
            Arc::new(db)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on shutdown");
            Arc::new(MemoryStorage::new())
        }
    };

    let state = AppState::new(tokens, passwords, store);
    let app = build_router(state, cors_layer(&config.cors_allowed_origins)?);

    let addr = (config.server.host.as_str(), config.server.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}:{}", addr.0, addr.1))?;

    tracing::info!("Book tracker server listening on http://{}", listener.local_addr()?);
    tracing::info!(
        "Access tokens expire after {} minutes",
        config.auth.token_ttl.num_minutes()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Duration;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::auth::HashCost;

    fn test_app() -> Router {
        let state = AppState::new(
            TokenService::new("router-test-secret", Duration::minutes(45)).unwrap(),
            PasswordService::new(HashCost::minimal()).unwrap(),
            Arc::new(MemoryStorage::new()),
        );
        build_router(state, cors_layer(&[]).unwrap())
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        read(app, request).await
    }

    async fn read(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn register(app: &Router, username: &str, email: &str, password: &str) -> (StatusCode, Value) {
        send(
            app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": username, "email": email, "password": password })),
        )
        .await
    }

    async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "username={}&password={}",
                email.replace('@', "%40"),
                password
            )))
            .unwrap();
        read(app, request).await
    }

    async fn token_for(app: &Router, username: &str, email: &str) -> String {
        let (status, _) = register(app, username, email, "secret-pw").await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = login(app, email, "secret-pw").await;
        assert_eq!(status, StatusCode::OK);
        body["access_token"].as_str().unwrap().to_string()
    }

    fn book(title: &str, pages_count: i32, pages_read: i32) -> Value {
        json!({
            "title": title,
            "author": "Ursula K. Le Guin",
            "pages_count": pages_count,
            "pages_read": pages_read,
        })
    }

    #[tokio::test]
    async fn test_ping() {
        let app = test_app();
        let (status, body) = send(&app, Method::GET, "/ping", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "pong" }));

        let (status, _) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_user_lifecycle() {
        let app = test_app();

        let (status, user) = register(&app, "foo", "foo@bar.com", "foo").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["id"], 1);
        assert_eq!(user["email"], "foo@bar.com");
        assert!(user.get("password_hash").is_none());

        let (status, body) = login(&app, "foo@bar.com", "foo").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["expires_in"], 45 * 60);
        let token = body["access_token"].as_str().unwrap().to_string();

        let (status, body) = login(&app, "foo@bar.com", "wrong").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "invalid credentials");

        let (status, body) = send(&app, Method::GET, "/users/1", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "foo");
        assert_eq!(body["books"], json!([]));

        // No user 2 exists yet.
        let (status, _) = send(&app, Method::GET, "/users/2", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = register(&app, "bar", "bar@bar.com", "bar").await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(&app, Method::GET, "/users/2", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "you cannot view this user");

        let (status, body) = send(&app, Method::DELETE, "/users/1", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, _) = login(&app, "foo@bar.com", "foo").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // The token outlives its user but no longer authenticates.
        let (status, _) = send(&app, Method::GET, "/books", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_email_matches_wrong_password() {
        let app = test_app();
        register(&app, "foo", "foo@bar.com", "foo").await;

        let (unknown_status, unknown_body) = login(&app, "nobody@bar.com", "foo").await;
        let (wrong_status, wrong_body) = login(&app, "foo@bar.com", "nope").await;
        assert_eq!(unknown_status, StatusCode::FORBIDDEN);
        assert_eq!(unknown_status, wrong_status);
        assert_eq!(unknown_body, wrong_body);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let app = test_app();

        let (status, _) = register(&app, "", "foo@bar.com", "foo").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = register(&app, "foo", "not-an-email", "foo").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = register(&app, "foo", "foo@bar.com", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = register(&app, "foo", "foo@bar.com", "foo").await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = register(&app, "foo2", "FOO@bar.com", "foo").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "email is taken");

        let (status, _) = login(&app, "", "foo").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_or_invalid_token() {
        let app = test_app();

        let (status, body) = send(&app, Method::GET, "/books", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "access token required");

        let (status, body) = send(&app, Method::GET, "/users/1", Some("not.a.token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid access token");
    }

    #[tokio::test]
    async fn test_book_validation() {
        let app = test_app();
        let token = token_for(&app, "foo", "foo@bar.com").await;

        let (status, _) = send(&app, Method::POST, "/books/", Some(&token), Some(book("Earthsea", 500, 1000))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::POST, "/books/", Some(&token), Some(book("Earthsea", 0, 0))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::POST, "/books/", Some(&token), Some(book("", 100, 0))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, created) = send(&app, Method::POST, "/books/", Some(&token), Some(book("Earthsea", 500, 120))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["owner_id"], 1);
        assert_eq!(created["pages_read"], 120);
    }

    #[tokio::test]
    async fn test_book_crud_and_ownership() {
        let app = test_app();
        let alice = token_for(&app, "alice", "alice@example.com").await;
        let bob = token_for(&app, "bob", "bob@example.com").await;

        let (_, created) = send(&app, Method::POST, "/books", Some(&alice), Some(book("The Dispossessed", 387, 0))).await;
        let uri = format!("/books/{}", created["id"]);

        let (status, listed) = send(&app, Method::GET, "/books/", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
        let (_, listed) = send(&app, Method::GET, "/books", Some(&bob), None).await;
        assert_eq!(listed, json!([]));

        let (status, _) = send(&app, Method::GET, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, Method::GET, "/books/999", Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::GET, "/books/abc", Some(&alice), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::PATCH, &uri, Some(&alice), Some(json!({ "pages_read": 400 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, updated) = send(&app, Method::PATCH, &uri, Some(&alice), Some(json!({ "pages_read": 200 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["pages_read"], 200);
        assert_eq!(updated["title"], "The Dispossessed");

        let (status, _) = send(&app, Method::PATCH, &uri, Some(&bob), Some(json!({ "pages_read": 1 }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, Method::DELETE, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, profile) = send(&app, Method::GET, "/users/1", Some(&alice), None).await;
        assert_eq!(profile["books"].as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_user() {
        let app = test_app();
        let token = token_for(&app, "foo", "foo@bar.com").await;
        token_for(&app, "bar", "bar@bar.com").await;

        let (status, body) = send(&app, Method::PATCH, "/users/1", Some(&token), Some(json!({ "email": "bar@bar.com" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "email is taken");

        let (status, _) = send(&app, Method::PATCH, "/users/1", Some(&token), Some(json!({ "email": "nope" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::PATCH, "/users/2", Some(&token), Some(json!({ "username": "x" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, updated) = send(
            &app,
            Method::PATCH,
            "/users/1",
            Some(&token),
            Some(json!({ "username": "fooz", "password": "new-pw" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["username"], "fooz");
        assert_eq!(updated["email"], "foo@bar.com");

        let (status, _) = login(&app, "foo@bar.com", "secret-pw").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = login(&app, "foo@bar.com", "new-pw").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_cors_layer_rejects_bad_origin() {
        assert!(cors_layer(&["https://books.example.com".to_string()]).is_ok());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
    }
}
