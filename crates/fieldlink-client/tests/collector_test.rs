//! Integration tests for fieldlink-client
//!
//! These tests run an in-process collector and use the client against it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fieldlink_client::testing::TestServer;
use fieldlink_client::{
    ClientError, CollectorApi, CollectorClient, CollectorError, SampleRecord, SessionId,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

// =============================================================================
// In-process collector
// =============================================================================

#[derive(Default)]
struct Collector {
    next_id: AtomicU32,
    open: Mutex<HashSet<String>>,
    sessions: Mutex<Vec<Value>>,
    samples: Mutex<Vec<Value>>,
}

type Shared = Arc<Collector>;

async fn create_session(State(c): State<Shared>, Json(body): Json<Value>) -> impl IntoResponse {
    let id = format!("sess-{}", c.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    c.open.lock().insert(id.clone());
    c.sessions.lock().push(body);
    (StatusCode::CREATED, Json(json!({ "id": id })))
}

async fn create_sample(State(c): State<Shared>, Json(body): Json<Value>) -> Response {
    let id = body["sessionId"].as_str().unwrap_or_default().to_string();
    if !c.open.lock().contains(&id) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("session {} not found", id) })),
        )
            .into_response();
    }
    c.samples.lock().push(body);
    StatusCode::CREATED.into_response()
}

async fn end_session(State(c): State<Shared>, Path(id): Path<String>) -> Response {
    if c.open.lock().remove(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("session {} not found", id) })),
        )
            .into_response()
    }
}

fn collector_router(state: Shared) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/sessions", post(create_session))
        .route("/api/samples", post(create_sample))
        .route("/api/sessions/{id}/end", post(end_session))
        .with_state(state)
}

async fn start() -> (TestServer, Shared) {
    let state = Shared::default();
    let server = TestServer::start(collector_router(state.clone())).await.unwrap();
    (server, state)
}

fn record(session_id: &SessionId) -> SampleRecord {
    SampleRecord {
        session_id: session_id.clone(),
        voltage: Some(12.6),
        ignition_state: Some(true),
        engine_speed: Some(750),
        raw_debug_string: "vin=1HGCM82633A004352 mode=Hardware".to_string(),
    }
}

// =============================================================================
// Session lifecycle
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (server, _) = start().await;
    assert_eq!(server.client.health().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_create_session_sends_camel_case_body() {
    let (server, state) = start().await;

    let id = server
        .client
        .create_session("field-unit-01", "ELM327", "ISO 15765-4 (CAN 11/500)")
        .await
        .unwrap();
    assert_eq!(id, SessionId("sess-1".into()));

    let sessions = state.sessions.lock().clone();
    assert_eq!(
        sessions,
        vec![json!({
            "clientId": "field-unit-01",
            "adapterType": "ELM327",
            "protocolName": "ISO 15765-4 (CAN 11/500)"
        })]
    );
}

#[tokio::test]
async fn test_sample_round_trip() {
    let (server, state) = start().await;
    let id = server.client.create_session("unit", "Simulated", "Unknown").await.unwrap();

    server.client.create_sample(&record(&id)).await.unwrap();

    let samples = state.samples.lock().clone();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0]["sessionId"], "sess-1");
    assert_eq!(samples[0]["voltage"], 12.6);
    assert_eq!(samples[0]["ignitionState"], true);
    assert_eq!(samples[0]["engineSpeed"], 750);
}

#[tokio::test]
async fn test_end_session_then_sample_is_unknown_session() {
    let (server, _) = start().await;
    let id = server.client.create_session("unit", "ELM327", "AUTO").await.unwrap();

    server.client.end_session(&id).await.unwrap();

    let err = server.client.create_sample(&record(&id)).await.unwrap_err();
    assert!(matches!(err, CollectorError::UnknownSession(ref m) if m.contains("sess-1")));

    // Ending twice is reported, not ignored
    let err = server.client.close_session(&id).await.unwrap_err();
    assert!(matches!(err, ClientError::SessionNotFound(_)));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_server_error_is_rejected() {
    let router = Router::new().route(
        "/api/samples",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "database unavailable" })),
            )
        }),
    );
    let server = TestServer::start(router).await.unwrap();

    let err = server
        .client
        .create_sample(&record(&SessionId("sess-1".into())))
        .await
        .unwrap_err();
    match err {
        CollectorError::Rejected { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "database unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_error_without_body_uses_status_text() {
    let router = Router::new().route("/api/sessions", post(|| async { StatusCode::BAD_REQUEST }));
    let server = TestServer::start(router).await.unwrap();

    let err = server.client.open_session("unit", "ELM327", "AUTO").await.unwrap_err();
    match err {
        ClientError::ServerError { status, message } => {
            assert_eq!(status, 400);
            assert!(message.starts_with("HTTP 400"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_garbage_session_response_is_invalid() {
    let router = Router::new().route(
        "/api/sessions",
        post(|| async { (StatusCode::CREATED, "not json") }),
    );
    let server = TestServer::start(router).await.unwrap();

    let err = server.client.create_session("unit", "ELM327", "AUTO").await.unwrap_err();
    assert!(matches!(err, CollectorError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_slow_collector_times_out() {
    let router = Router::new().route(
        "/api/samples",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            StatusCode::CREATED
        }),
    );
    let server = TestServer::start_with_timeout(
        router,
        Duration::from_millis(200),
        Duration::from_millis(200),
    )
    .await
    .unwrap();

    let err = server
        .client
        .create_sample(&record(&SessionId("sess-1".into())))
        .await
        .unwrap_err();
    assert!(matches!(err, CollectorError::Timeout));
}

#[tokio::test]
async fn test_unreachable_collector() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = CollectorClient::with_config(
        &format!("http://{}", addr),
        Duration::from_secs(1),
        Duration::from_millis(500),
    )
    .unwrap();

    let err = client.create_session("unit", "ELM327", "AUTO").await.unwrap_err();
    assert!(matches!(err, CollectorError::Unreachable(_)));
}
