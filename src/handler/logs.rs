use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::app::AppState;
use crate::domain::{LogFilter, LogHeader, LogView};
use crate::error::ScribeError;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Header fields as clients send them.
#[derive(Debug, Default, Deserialize)]
pub struct HeaderInput {
    #[serde(default)]
    pub title: String,
    pub severity: Option<String>,
    pub source: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
}

impl HeaderInput {
    fn into_header(self) -> LogHeader {
        LogHeader::from_raw(
            self.title,
            self.severity.as_deref(),
            self.source,
            self.color.as_deref(),
            self.description,
        )
    }
}

/// Either `{"header": {..}, "body": {..}}` or the header fields at the top
/// level next to `body`. A nested header wins when both are present.
#[derive(Debug, Default, Deserialize)]
pub struct CreateLogRequest {
    pub header: Option<HeaderInput>,
    #[serde(flatten)]
    pub flat: HeaderInput,
    #[serde(default)]
    pub body: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub severity: Option<String>,
    pub source: Option<String>,
    pub color: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub offset: Option<u32>,
}

impl ListQuery {
    pub(crate) fn filter(&self) -> Result<LogFilter, ScribeError> {
        LogFilter::from_raw(
            self.search.as_deref(),
            self.severity.as_deref(),
            self.source.as_deref(),
            self.color.as_deref(),
            self.from.as_deref(),
            self.to.as_deref(),
        )
    }

    /// `(limit, offset, page)`; an explicit offset wins over `page`.
    fn window(&self) -> (u32, u32, u32) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        match self.offset {
            Some(offset) => (limit, offset, offset / limit + 1),
            None => {
                let page = self.page.unwrap_or(1).max(1);
                (limit, (page - 1).saturating_mul(limit), page)
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub logs: Vec<LogView>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub page: u32,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
}

/// Handler for POST /api/logs
pub async fn create_log(
    State(state): State<AppState>,
    payload: Result<Json<CreateLogRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LogView>), ScribeError> {
    let Json(request) = payload?;
    let header = request.header.unwrap_or(request.flat).into_header();
    let record = state.logs.ingest(header, request.body).await?;
    Ok((StatusCode::CREATED, Json(record.to_view())))
}

/// Handler for GET /api/logs
pub async fn list_logs(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ListResponse>, ScribeError> {
    let Query(query) = query?;
    let (limit, offset, page) = query.window();
    let filter = query.filter()?.with_page(limit, offset);

    let result = state.logs.list(filter).await?;
    Ok(Json(ListResponse {
        logs: result.records.iter().map(|r| r.to_view()).collect(),
        total: result.total,
        limit,
        offset,
        page,
    }))
}

/// Handler for GET /api/logs/{id}
pub async fn get_log(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<LogView>, ScribeError> {
    let Path(id) = id?;
    let record = state.logs.get(id).await?;
    Ok(Json(record.to_view()))
}

/// Handler for DELETE /api/logs/{id}
pub async fn delete_log(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ScribeError> {
    let Path(id) = id?;
    state.logs.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for DELETE /api/logs
pub async fn delete_logs(
    State(state): State<AppState>,
    payload: Result<Json<BulkDeleteRequest>, JsonRejection>,
) -> Result<Json<BulkDeleteResponse>, ScribeError> {
    let Json(request) = payload?;
    let deleted = state.logs.delete_many(&request.ids).await?;
    Ok(Json(BulkDeleteResponse { deleted }))
}
