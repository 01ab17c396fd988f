use axum::Json;
use axum::extract::State;

use crate::app::AppState;
use crate::domain::StatsSnapshot;
use crate::error::ScribeError;

/// Handler for GET /api/stats
pub async fn stats_handler(
    State(state): State<AppState>,
) -> Result<Json<StatsSnapshot>, ScribeError> {
    Ok(Json(state.logs.stats().await?))
}
