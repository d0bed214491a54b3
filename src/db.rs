//! SQLite connection setup and embedded migrations.

use crate::error::{DbError, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;

/// Handle to the relational store.
#[derive(Debug, Clone)]
pub struct Db {
    pub sqlite: SqlitePool,
}

impl Db {
    /// Open (creating if needed) the database file and apply pending migrations.
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let sqlite = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(DbError::SqliteConnect)?;

        Self::migrate(&sqlite).await?;
        tracing::debug!(path = %path.display(), "sqlite ready");

        Ok(Self { sqlite })
    }

    /// A private in-memory database with the full schema. Single connection,
    /// since every new connection to `sqlite::memory:` sees an empty database.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = "sqlite::memory:"
            .parse::<SqliteConnectOptions>()
            .map_err(DbError::SqliteConnect)?
            .foreign_keys(true);

        let sqlite = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(DbError::SqliteConnect)?;

        Self::migrate(&sqlite).await?;
        Ok(Self { sqlite })
    }

    pub async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|error| DbError::Migration(error.to_string()))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.sqlite.close().await;
    }
}
