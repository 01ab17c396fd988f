use scribe::adapter::sqlite::SqliteStore;
use scribe::app::{AppState, build_router, server};
use scribe::config::Settings;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Reads from the stream until `needle` shows up, returning everything read.
async fn read_until(response: &mut reqwest::Response, buffer: &mut String, needle: &str) {
    while !buffer.contains(needle) {
        let chunk = timeout(Duration::from_secs(5), response.chunk())
            .await
            .expect("timed out waiting for event")
            .unwrap()
            .expect("stream ended early");
        buffer.push_str(&String::from_utf8_lossy(&chunk));
    }
}

#[tokio::test]
async fn test_event_stream_delivers_connected_and_created() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(&dir.path().join("events.db"), 2)
        .await
        .unwrap();
    let token = CancellationToken::new();
    let state = AppState::new(Arc::new(store), Settings::default(), token.clone()).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(server::serve_with_listener(
        listener,
        build_router(state.clone()),
        token.clone(),
        Duration::from_secs(2),
    ));

    let client = reqwest::Client::new();
    let mut events = client
        .get(format!("{base}/api/events"))
        .send()
        .await
        .unwrap();
    assert!(events.status().is_success());
    assert_eq!(
        events.headers()[reqwest::header::CONTENT_TYPE],
        "text/event-stream"
    );

    let mut buffer = String::new();
    read_until(&mut events, &mut buffer, "event: connected").await;
    assert_eq!(state.hub.client_count().await, 1);

    let created = client
        .post(format!("{base}/api/logs"))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(r#"{"title":"Unauthorized access to /admin"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(created.status().as_u16(), 201);

    read_until(&mut events, &mut buffer, "event: log_created").await;
    read_until(&mut events, &mut buffer, "Unauthorized access to /admin").await;
    assert!(buffer.contains(r#""type":"log_created""#), "{buffer}");

    token.cancel();
    let stopped = timeout(Duration::from_secs(5), server).await;
    assert!(stopped.is_ok(), "server should stop once streams end");
    state.join_background().await;
}
