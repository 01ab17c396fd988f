use axum::Router;
use axum::http::{HeaderName, Method, header};
use axum::middleware;
use axum::routing::{get, post};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::AppState;
use crate::governor::rate_limit;
use crate::handler::events::stream_events;
use crate::handler::export::{export_csv, export_json};
use crate::handler::health::health_handler;
use crate::handler::logs::{create_log, delete_log, delete_logs, get_log, list_logs};
use crate::handler::metrics::{metrics_json, metrics_prometheus};
use crate::handler::retention::{cleanup, retention_report};
use crate::handler::stats::stats_handler;
use crate::metrics::track_metrics;

/// Build the HTTP router.
///
/// Layers, outermost first: CORS, request tracing, metrics, rate limiting.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/logs",
            post(create_log).get(list_logs).delete(delete_logs),
        )
        .route("/logs/{id}", get(get_log).delete(delete_log))
        .route("/stats", get(stats_handler))
        .route("/export/json", get(export_json))
        .route("/export/csv", get(export_csv))
        .route("/events", get(stream_events))
        .route("/admin/retention", get(retention_report))
        .route("/admin/cleanup", post(cleanup));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_json))
        .route("/metrics/prometheus", get(metrics_prometheus))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(
            state.governor.clone(),
            rate_limit,
        ))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_metrics,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
        .max_age(Duration::from_secs(3600))
}
