use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::domain::{Category, Color, LogHeader, LogMetadata, LogRecord, NewLogRecord, Severity};
use crate::error::ScribeError;

pub(crate) const COLUMNS: &str = "id, title, severity, source, color, description, body, \
     derived_severity, derived_source, derived_category, created_at";

/// Fixed-width UTC text, so lexical order matches chronological order.
#[must_use]
pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|at| at.with_timezone(&Utc))
}

/// Column values bound by the insert statement.
#[derive(Debug, Clone)]
pub struct InsertRow {
    pub title: String,
    pub severity: String,
    pub source: Option<String>,
    pub color: Option<&'static str>,
    pub description: Option<String>,
    pub body: String,
    pub derived_severity: Option<String>,
    pub derived_source: Option<String>,
    pub derived_category: Option<&'static str>,
    pub created_at: String,
}

impl TryFrom<NewLogRecord> for InsertRow {
    type Error = ScribeError;

    fn try_from(record: NewLogRecord) -> Result<Self, Self::Error> {
        let body = serde_json::to_string(&record.body)
            .map_err(|e| ScribeError::Internal(format!("failed to serialize body: {e}")))?;

        Ok(Self {
            title: record.header.title,
            severity: record.header.severity.to_string(),
            source: record.header.source,
            color: record.header.color.map(Color::as_str),
            description: record.header.description,
            body,
            derived_severity: record.metadata.derived_severity.map(String::from),
            derived_source: record.metadata.derived_source,
            derived_category: record.metadata.derived_category.map(Category::as_str),
            created_at: encode_timestamp(record.created_at),
        })
    }
}

/// A row as read back, before body and timestamp are decoded.
#[derive(Debug, Clone)]
pub struct LogRow {
    pub id: i64,
    pub title: String,
    pub severity: Option<String>,
    pub source: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub derived_severity: Option<String>,
    pub derived_source: Option<String>,
    pub derived_category: Option<String>,
    pub created_at: String,
}

impl LogRow {
    pub fn from_sqlite(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            severity: row.try_get("severity")?,
            source: row.try_get("source")?,
            color: row.try_get("color")?,
            description: row.try_get("description")?,
            body: row.try_get("body")?,
            derived_severity: row.try_get("derived_severity")?,
            derived_source: row.try_get("derived_source")?,
            derived_category: row.try_get("derived_category")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<LogRow> for LogRecord {
    type Error = ScribeError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let body = match row.body.as_deref().filter(|b| !b.is_empty()) {
            Some(raw) => serde_json::from_str::<Map<String, Value>>(raw).map_err(|e| {
                ScribeError::CorruptRow {
                    id,
                    reason: format!("body: {e}"),
                }
            })?,
            None => Map::new(),
        };
        let created_at = decode_timestamp(&row.created_at).map_err(|e| ScribeError::CorruptRow {
            id,
            reason: format!("created_at: {e}"),
        })?;

        Ok(Self {
            id,
            header: LogHeader {
                title: row.title,
                severity: row.severity.as_deref().map(Severity::parse).unwrap_or_default(),
                source: row.source.filter(|s| !s.is_empty()),
                color: row.color.as_deref().and_then(Color::parse),
                description: row.description.filter(|s| !s.is_empty()),
            },
            body,
            metadata: LogMetadata {
                derived_severity: row
                    .derived_severity
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .map(Severity::parse),
                derived_source: row.derived_source.filter(|s| !s.is_empty()),
                derived_category: row
                    .derived_category
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .map(Category::parse),
            },
            created_at,
        })
    }
}
