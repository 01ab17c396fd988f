use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ScribeError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    severity TEXT NOT NULL DEFAULT 'info',
    source TEXT,
    color TEXT,
    description TEXT,
    body TEXT NOT NULL DEFAULT '{}',
    derived_severity TEXT,
    derived_source TEXT,
    derived_category TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_logs_severity ON logs(severity);
CREATE INDEX IF NOT EXISTS idx_logs_source ON logs(source);
CREATE INDEX IF NOT EXISTS idx_logs_created_at ON logs(created_at);
CREATE INDEX IF NOT EXISTS idx_logs_derived_severity ON logs(derived_severity);
CREATE INDEX IF NOT EXISTS idx_logs_derived_source ON logs(derived_source);
";

/// Writer pool pinned to one connection plus a read-only reader pool.
#[derive(Debug, Clone)]
pub struct Database {
    pub(crate) writer: SqlitePool,
    pub(crate) reader: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database file in WAL mode and
    /// bootstraps the schema.
    pub async fn open(path: &Path, read_pool_size: u32) -> Result<Self, ScribeError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ScribeError::Internal(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let base = SqliteConnectOptions::new()
            .filename(path)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        // The writer connection stays open for the life of the store so the
        // WAL index remains available to read-only connections.
        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(
                base.clone()
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal),
            )
            .await
            .map_err(ScribeError::store("failed to open writer connection"))?;

        sqlx::raw_sql(SCHEMA)
            .execute(&writer)
            .await
            .map_err(ScribeError::store("failed to bootstrap schema"))?;

        let reader = SqlitePoolOptions::new()
            .max_connections(read_pool_size.max(1))
            .connect_with(base.read_only(true))
            .await
            .map_err(ScribeError::store("failed to open reader pool"))?;

        info!(path = %path.display(), read_pool_size, "opened sqlite store");
        Ok(Self { writer, reader })
    }

    /// Merges the write-ahead log into the main file, then closes both pools.
    /// A failed checkpoint is logged and the pools are closed anyway.
    pub async fn close(&self) {
        self.reader.close().await;

        match sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.writer)
            .await
        {
            Ok(_) => info!("wal checkpoint complete"),
            Err(e) => warn!(error = %e, "wal checkpoint failed"),
        }

        self.writer.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_file_and_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("scribe.db");

        let db = Database::open(&path, 2).await.unwrap();
        assert!(path.exists());

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'logs'",
        )
        .fetch_one(&db.reader)
        .await
        .unwrap();
        assert_eq!(tables, 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scribe.db");

        Database::open(&path, 1).await.unwrap().close().await;
        let db = Database::open(&path, 1).await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_reader_pool_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("scribe.db"), 1).await.unwrap();

        let result = sqlx::query("DELETE FROM logs").execute(&db.reader).await;
        assert!(result.is_err());
        db.close().await;
    }

    #[tokio::test]
    async fn test_close_truncates_wal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scribe.db");
        let db = Database::open(&path, 1).await.unwrap();
        sqlx::query("INSERT INTO logs (title, created_at) VALUES ('t', '2024-01-01T00:00:00.000000Z')")
            .execute(&db.writer)
            .await
            .unwrap();

        db.close().await;

        let wal = dir.path().join("scribe.db-wal");
        let wal_len = std::fs::metadata(&wal).map(|m| m.len()).unwrap_or(0);
        assert_eq!(wal_len, 0);
    }
}
