use scribe::adapter::sqlite::SqliteStore;
use scribe::app::{AppState, build_router, server};
use scribe::config::Settings;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Healthcheck passes against the real router and the server stops on cancel
#[tokio::test]
async fn test_healthcheck_succeeds_against_running_server() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(&dir.path().join("health.db"), 2)
        .await
        .unwrap();
    let token = CancellationToken::new();
    let state = AppState::new(Arc::new(store), Settings::default(), token.clone()).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(server::serve_with_listener(
        listener,
        build_router(state.clone()),
        token.clone(),
        Duration::from_secs(1),
    ));

    let result = scribe::healthcheck_with_port(port).await;
    assert!(result.is_ok(), "Healthcheck should succeed: {result:?}");

    token.cancel();
    let stopped = tokio::time::timeout(Duration::from_secs(5), server).await;
    assert!(stopped.is_ok(), "server should stop after cancellation");
    assert!(stopped.unwrap().unwrap().is_ok());

    state.join_background().await;
    state.store.close().await.unwrap();
}

/// Test that healthcheck fails when server is not running
#[tokio::test]
async fn test_healthcheck_fails_when_server_not_running() {
    let result = scribe::healthcheck_with_port(free_port()).await;
    assert!(
        result.is_err(),
        "Healthcheck should fail when server is not running"
    );
}

/// Test that healthcheck fails when server returns non-2xx status
#[tokio::test]
async fn test_healthcheck_fails_on_non_success_status() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mock_server = tokio::spawn(async move {
        let app = axum::Router::new().route(
            "/health",
            axum::routing::get(|| async {
                (axum::http::StatusCode::SERVICE_UNAVAILABLE, "Unhealthy")
            }),
        );
        axum::serve(listener, app).await.unwrap();
    });

    let result = scribe::healthcheck_with_port(port).await;
    assert!(result.is_err(), "Healthcheck should fail on non-2xx status");
    assert!(result.unwrap_err().to_string().contains("503"));

    mock_server.abort();
}

/// A 2xx answer that does not report `"status": "ok"` is still unhealthy
#[tokio::test]
async fn test_healthcheck_fails_on_unexpected_body() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mock_server = tokio::spawn(async move {
        let app = axum::Router::new().route(
            "/health",
            axum::routing::get(|| async { axum::Json(serde_json::json!({"status": "degraded"})) }),
        );
        axum::serve(listener, app).await.unwrap();
    });

    let result = scribe::healthcheck_with_port(port).await;
    let err = result.unwrap_err();
    assert!(
        matches!(err, scribe::healthcheck::HealthcheckError::UnexpectedBody { .. }),
        "{err:?}"
    );
    assert!(err.to_string().contains("degraded"));

    mock_server.abort();
}
