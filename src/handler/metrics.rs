use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::app::AppState;
use crate::error::ScribeError;
use crate::metrics::{MetricsSnapshot, render_prometheus};

async fn snapshot(state: &AppState) -> MetricsSnapshot {
    let sse_clients = state.hub.client_count().await;
    state
        .metrics
        .snapshot(sse_clients, state.hub.dropped_events())
}

/// Handler for GET /metrics
pub async fn metrics_json(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(snapshot(&state).await)
}

/// Handler for GET /metrics/prometheus
pub async fn metrics_prometheus(State(state): State<AppState>) -> Result<Response, ScribeError> {
    let body = render_prometheus(&snapshot(&state).await)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
