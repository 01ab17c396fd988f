//! Filter predicate shared by page and count queries.

use sqlx::{QueryBuilder, Sqlite};

use super::row::{COLUMNS, encode_timestamp};
use crate::domain::LogFilter;

/// Effective severity: derived when present, otherwise explicit.
pub(crate) const EFFECTIVE_SEVERITY: &str =
    "COALESCE(NULLIF(derived_severity, ''), NULLIF(severity, ''), 'info')";
pub(crate) const EFFECTIVE_SOURCE: &str = "COALESCE(NULLIF(derived_source, ''), source)";

/// Escapes `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'`.
#[must_use]
pub fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Appends `WHERE ...` for every criterion present in `filter`.
pub(crate) fn push_predicate(qb: &mut QueryBuilder<'_, Sqlite>, filter: &LogFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(search) = filter.search.as_deref() {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (title LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR description LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR body LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(severity) = &filter.severity {
        qb.push(" AND ")
            .push(EFFECTIVE_SEVERITY)
            .push(" = ")
            .push_bind(severity.to_string());
    }
    if let Some(source) = &filter.source {
        qb.push(" AND ")
            .push(EFFECTIVE_SOURCE)
            .push(" = ")
            .push_bind(source.clone());
    }
    if let Some(color) = filter.color {
        qb.push(" AND color = ").push_bind(color.as_str());
    }
    if let Some(from) = filter.from {
        qb.push(" AND created_at >= ").push_bind(encode_timestamp(from));
    }
    if let Some(to) = filter.to {
        qb.push(" AND created_at <= ").push_bind(encode_timestamp(to));
    }
}

pub(crate) fn page_query(filter: &LogFilter) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new(format!("SELECT {COLUMNS} FROM logs"));
    push_predicate(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC, id DESC");

    match filter.limit {
        Some(limit) => {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }
        // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
        None if filter.offset > 0 => {
            qb.push(" LIMIT -1");
        }
        None => {}
    }
    if filter.offset > 0 {
        qb.push(" OFFSET ").push_bind(i64::from(filter.offset));
    }
    qb
}

pub(crate) fn count_query(filter: &LogFilter) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) AS total FROM logs");
    push_predicate(&mut qb, filter);
    qb
}
