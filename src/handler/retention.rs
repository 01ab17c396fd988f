use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use serde::Deserialize;

use crate::app::AppState;
use crate::domain::AgeReport;
use crate::error::ScribeError;
use crate::service::CleanupReport;

#[derive(Debug, Default, Deserialize)]
pub struct CleanupRequest {
    pub retention_days: Option<i64>,
}

/// Handler for GET /api/admin/retention
pub async fn retention_report(
    State(state): State<AppState>,
) -> Result<Json<AgeReport>, ScribeError> {
    Ok(Json(state.retention.age_report().await?))
}

/// Handler for POST /api/admin/cleanup
///
/// An empty body, with or without a JSON content type, or one without
/// `retention_days`, uses the configured retention period.
pub async fn cleanup(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CleanupReport>, ScribeError> {
    let request = parse_cleanup_request(&body)?;
    let days = request
        .retention_days
        .unwrap_or_else(|| i64::from(state.settings.retention_days));
    Ok(Json(state.retention.cleanup(days).await?))
}

fn parse_cleanup_request(body: &[u8]) -> Result<CleanupRequest, ScribeError> {
    if body.trim_ascii().is_empty() {
        return Ok(CleanupRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ScribeError::validation(format!("invalid request body: {e}")))
}
