//! # Word Store
//!
//! The relational store is owned by the rest of the application; this server
//! only reads from it. Connections come from a small SQLite pool and are
//! checked out per request.

pub mod words;

pub use words::{SqliteWordStore, Word, WordStore};

use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Open the connection pool described by `config`.
///
/// The database must already exist. Creating or migrating the schema is the
/// job of whatever owns the `words` table.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("invalid database URL '{}'", config.url))?
        .create_if_missing(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open database '{}'", config.url))?;

    info!(
        url = %config.url,
        max_connections = config.max_connections,
        "Database pool ready"
    );

    Ok(pool)
}
