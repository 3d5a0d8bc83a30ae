//! Configuration module for environment variables and application settings

use std::env;

use anyhow::{anyhow, Context, Result};
use chrono::Duration;

use crate::auth::jwt::DEFAULT_TOKEN_TTL_MINUTES;
use crate::auth::HashCost;
use crate::database::connection::parse_ssl_mode;
use crate::database::DatabaseConfig;

/// Application configuration, built once at start-up.
///
/// Deliberately not `Debug`: it holds the token secret and the database password.
#[derive(Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub storage: StorageBackend,
    pub database: DatabaseConfig,
    /// Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub token_secret: String,
    pub token_ttl: Duration,
    pub hash_cost: HashCost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let server = ServerConfig {
            host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: match get("PORT").or_else(|| get("SERVER_PORT")) {
                Some(port) => port
                    .parse()
                    .with_context(|| format!("PORT must be a port number, got '{}'", port))?,
                None => 8000,
            },
        };

        let token_secret = get("ACCESS_TOKEN_SECRET_KEY")
            .ok_or_else(|| anyhow!("ACCESS_TOKEN_SECRET_KEY environment variable is required"))?;
        let ttl_minutes: i64 = parse_or(&get, "ACCESS_TOKEN_TTL_MINUTES", DEFAULT_TOKEN_TTL_MINUTES)?;
        if ttl_minutes <= 0 {
            anyhow::bail!("ACCESS_TOKEN_TTL_MINUTES must be positive");
        }

        let default_cost = HashCost::default();
        let auth = AuthConfig {
            token_secret,
            token_ttl: Duration::minutes(ttl_minutes),
            hash_cost: HashCost {
                memory_kib: parse_or(&get, "PASSWORD_HASH_MEMORY_KIB", default_cost.memory_kib)?,
                iterations: parse_or(&get, "PASSWORD_HASH_ITERATIONS", default_cost.iterations)?,
                parallelism: parse_or(&get, "PASSWORD_HASH_PARALLELISM", default_cost.parallelism)?,
            },
        };

        let storage = match get("STORAGE_BACKEND").map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => anyhow::bail!(
                "STORAGE_BACKEND must be 'postgres' or 'memory', got '{}'",
                other
            ),
        };

        let mut database = match get("DATABASE_URL") {
            Some(url) => DatabaseConfig::from_url(&url).context("DATABASE_URL is invalid")?,
            None => {
                let defaults = DatabaseConfig::default();
                DatabaseConfig {
                    host: get("DATABASE_HOSTNAME").unwrap_or(defaults.host.clone()),
                    port: parse_or(&get, "DATABASE_PORT", defaults.port)?,
                    user: get("DATABASE_USERNAME").unwrap_or(defaults.user.clone()),
                    password: get("DATABASE_PASSWORD").unwrap_or_default(),
                    dbname: get("DATABASE_NAME").unwrap_or(defaults.dbname.clone()),
                    timezone: get("DATABASE_TIMEZONE"),
                    ..defaults
                }
            }
        };
        if let Some(mode) = get("DATABASE_SSLMODE") {
            database.ssl_mode = parse_ssl_mode(&mode).context("DATABASE_SSLMODE is invalid")?;
        }
        database.max_size = parse_or(&get, "DATABASE_MAX_CONNECTIONS", database.max_size)?;

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            server,
            auth,
            storage,
            database,
            cors_allowed_origins,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}
