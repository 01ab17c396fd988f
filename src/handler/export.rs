use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::app::AppState;
use crate::domain::{LogRecord, format_timestamp};
use crate::error::ScribeError;
use crate::handler::logs::ListQuery;

pub const DEFAULT_EXPORT_LIMIT: u32 = 10_000;
pub const MAX_EXPORT_LIMIT: u32 = 100_000;

const CSV_COLUMNS: [&str; 7] = [
    "id",
    "severity",
    "source",
    "color",
    "title",
    "description",
    "created_at",
];

async fn export_records(state: &AppState, query: &ListQuery) -> Result<Vec<LogRecord>, ScribeError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EXPORT_LIMIT)
        .clamp(1, MAX_EXPORT_LIMIT);
    let filter = query.filter()?.with_page(limit, 0);
    Ok(state.logs.list(filter).await?.records)
}

/// Handler for GET /api/export/json
pub async fn export_json(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, ScribeError> {
    let Query(query) = query?;
    let records = export_records(&state, &query).await?;
    let views: Vec<_> = records.iter().map(LogRecord::to_view).collect();

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_DISPOSITION,
            "attachment; filename=scribe-logs.json",
        )],
        Json(views),
    )
        .into_response())
}

/// Handler for GET /api/export/csv
pub async fn export_csv(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, ScribeError> {
    let Query(query) = query?;
    let records = export_records(&state, &query).await?;
    let body = to_csv(&records)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=scribe-logs.csv",
            ),
        ],
        body,
    )
        .into_response())
}

/// One row per record with effective severity, source and color.
pub fn to_csv(records: &[LogRecord]) -> Result<Vec<u8>, ScribeError> {
    let csv_err = |e: csv::Error| ScribeError::Internal(format!("csv export: {e}"));

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS).map_err(csv_err)?;
    for record in records {
        let id = record.id.to_string();
        let severity = record.effective_severity().to_string();
        let created_at = format_timestamp(record.created_at);
        writer
            .write_record([
                id.as_str(),
                severity.as_str(),
                record.effective_source().unwrap_or(""),
                record.effective_color().as_str(),
                record.header.title.as_str(),
                record.header.description.as_deref().unwrap_or(""),
                created_at.as_str(),
            ])
            .map_err(csv_err)?;
    }
    writer
        .into_inner()
        .map_err(|e| ScribeError::Internal(format!("csv export: {}", e.error())))
}
