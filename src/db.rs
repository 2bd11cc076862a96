//! SQLite pool construction shared by the stores.

use std::path::Path;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

/// Open (creating if missing) the database file at `path`.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created or the
/// pool cannot connect.
pub async fn open(path: &Path) -> anyhow::Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create data directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open database {}", path.display()))?;

    info!(path = %path.display(), "database opened");
    Ok(pool)
}

/// Open an in-memory database for tests.
///
/// Pinned to a single connection with no recycling, otherwise each pool
/// connection would see its own empty memory database.
///
/// # Errors
///
/// Returns an error if the pool cannot connect.
pub async fn open_in_memory() -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new().in_memory(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .context("failed to open in-memory database")?;
    Ok(pool)
}
