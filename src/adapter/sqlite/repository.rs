use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use super::database::Database;
use super::query::{EFFECTIVE_SEVERITY, count_query, page_query};
use super::row::{COLUMNS, InsertRow, LogRow, encode_timestamp};
use crate::domain::{LogFilter, LogPage, LogRecord, NewLogRecord};
use crate::error::ScribeError;
use crate::port::{LogStore, StoreFuture};

/// `LogStore` backed by a local SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub async fn open(path: &Path, read_pool_size: u32) -> Result<Self, ScribeError> {
        Ok(Self {
            db: Database::open(path, read_pool_size).await?,
        })
    }

    async fn insert(&self, record: NewLogRecord) -> Result<i64, ScribeError> {
        record.validate()?;
        let row = InsertRow::try_from(record)?;

        let result = sqlx::query(
            r"
            INSERT INTO logs
                (title, severity, source, color, description, body,
                 derived_severity, derived_source, derived_category, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(row.title)
        .bind(row.severity)
        .bind(row.source)
        .bind(row.color)
        .bind(row.description)
        .bind(row.body)
        .bind(row.derived_severity)
        .bind(row.derived_source)
        .bind(row.derived_category)
        .bind(row.created_at)
        .execute(&self.db.writer)
        .await
        .map_err(ScribeError::store("failed to insert log"))?;

        Ok(result.last_insert_rowid())
    }

    async fn select_by_id(&self, id: i64) -> Result<LogRecord, ScribeError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM logs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.db.reader)
            .await
            .map_err(ScribeError::store("failed to fetch log"))?
            .ok_or(ScribeError::NotFound(id))?;

        let row = LogRow::from_sqlite(&row).map_err(ScribeError::store("failed to read log row"))?;
        LogRecord::try_from(row)
    }

    async fn select_page(&self, filter: LogFilter) -> Result<LogPage, ScribeError> {
        // Page and total come from the same snapshot.
        let mut tx = self
            .db
            .reader
            .begin()
            .await
            .map_err(ScribeError::store("failed to begin read"))?;

        let rows = page_query(&filter)
            .build()
            .fetch_all(&mut *tx)
            .await
            .map_err(ScribeError::store("failed to query logs"))?;
        let total: i64 = count_query(&filter)
            .build()
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(ScribeError::store("failed to count logs"))?;

        tx.commit()
            .await
            .map_err(ScribeError::store("failed to end read"))?;

        let records = rows.iter().filter_map(decode_or_skip).collect();
        Ok(LogPage {
            records,
            total: to_count(total),
        })
    }

    async fn scalar_count(&self, sql: &str, binds: &[String]) -> Result<u64, ScribeError> {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        for value in binds {
            query = query.bind(value.as_str());
        }
        let total = query
            .fetch_one(&self.db.reader)
            .await
            .map_err(ScribeError::store("failed to count logs"))?;
        Ok(to_count(total))
    }

    async fn grouped_count(&self, sql: &str) -> Result<BTreeMap<String, u64>, ScribeError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.db.reader)
            .await
            .map_err(ScribeError::store("failed to aggregate logs"))?;

        rows.iter()
            .map(|row| {
                let key: String = row.try_get("name")?;
                let total: i64 = row.try_get("total")?;
                Ok((key, to_count(total)))
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(ScribeError::store("failed to read aggregate row"))
    }

    async fn remove(&self, id: i64) -> Result<(), ScribeError> {
        let result = sqlx::query("DELETE FROM logs WHERE id = ?")
            .bind(id)
            .execute(&self.db.writer)
            .await
            .map_err(ScribeError::store("failed to delete log"))?;

        if result.rows_affected() == 0 {
            return Err(ScribeError::NotFound(id));
        }
        Ok(())
    }

    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, ScribeError> {
        let result = sqlx::query("DELETE FROM logs WHERE created_at < ?")
            .bind(encode_timestamp(cutoff))
            .execute(&self.db.writer)
            .await
            .map_err(ScribeError::store("failed to delete old logs"))?;

        debug!(deleted = result.rows_affected(), %cutoff, "deleted logs older than cutoff");
        Ok(result.rows_affected())
    }
}

/// Corrupt rows are logged and left out of multi-row results.
fn decode_or_skip(row: &SqliteRow) -> Option<LogRecord> {
    let decoded = LogRow::from_sqlite(row)
        .map_err(|e| ScribeError::Store {
            context: "failed to read log row",
            source: e,
        })
        .and_then(LogRecord::try_from);
    match decoded {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, "skipping malformed log row");
            None
        }
    }
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

impl LogStore for SqliteStore {
    fn create(&self, record: NewLogRecord) -> StoreFuture<'_, i64> {
        Box::pin(self.insert(record))
    }

    fn find_by_id(&self, id: i64) -> StoreFuture<'_, LogRecord> {
        Box::pin(self.select_by_id(id))
    }

    fn find_all(&self, filter: LogFilter) -> StoreFuture<'_, LogPage> {
        Box::pin(self.select_page(filter))
    }

    fn count(&self) -> StoreFuture<'_, u64> {
        Box::pin(self.scalar_count("SELECT COUNT(*) FROM logs", &[]))
    }

    fn count_in_range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreFuture<'_, u64> {
        let mut sql = String::from("SELECT COUNT(*) FROM logs WHERE 1 = 1");
        let mut binds = Vec::new();
        if let Some(from) = from {
            sql.push_str(" AND created_at >= ?");
            binds.push(encode_timestamp(from));
        }
        if let Some(to) = to {
            sql.push_str(" AND created_at < ?");
            binds.push(encode_timestamp(to));
        }
        Box::pin(async move { self.scalar_count(&sql, &binds).await })
    }

    fn count_by_severity(&self) -> StoreFuture<'_, BTreeMap<String, u64>> {
        let sql = format!(
            "SELECT {EFFECTIVE_SEVERITY} AS name, COUNT(*) AS total FROM logs GROUP BY name"
        );
        Box::pin(async move { self.grouped_count(&sql).await })
    }

    fn count_by_source(&self) -> StoreFuture<'_, BTreeMap<String, u64>> {
        Box::pin(self.grouped_count(
            "SELECT COALESCE(NULLIF(source, ''), 'unknown') AS name, COUNT(*) AS total \
             FROM logs GROUP BY name",
        ))
    }

    fn delete(&self, id: i64) -> StoreFuture<'_, ()> {
        Box::pin(self.remove(id))
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(self.remove_older_than(cutoff))
    }

    fn close(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.db.close().await;
            Ok(())
        })
    }
}
