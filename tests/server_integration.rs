use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use chat_session_relay::AppState;
use chat_session_relay::config::AppConfig;
use chat_session_relay::llm::EchoEngine;
use chat_session_relay::server;
use chat_session_relay::session::SessionRegistry;
use serde_json::{Value, json};
use serial_test::serial;

fn app() -> axum::Router {
    let config = AppConfig::load_from_args(["chat-session-relay"]).expect("defaults should load");
    server::router(AppState {
        engine: Arc::new(EchoEngine::new(Duration::ZERO)),
        sessions: SessionRegistry::new(),
        config: Arc::new(config),
    })
}

#[tokio::test]
#[serial]
async fn test_health() {
    let server = TestServer::new(app()).unwrap();

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine"], "echo");
    assert_eq!(body["active_sessions"], 0);
}

#[tokio::test]
#[serial]
async fn test_sessions_empty() {
    let server = TestServer::new(app()).unwrap();

    let response = server.get("/api/sessions").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, json!([]));
}

#[tokio::test]
#[serial]
async fn test_websocket_round_trip() {
    let server = TestServer::builder().http_transport().build(app()).unwrap();

    let mut ws = server.get_websocket("/ws").await.into_websocket().await;

    // Unparseable frames are ignored; the session keeps going.
    ws.send_text("not json").await;
    ws.send_json(&json!({"message": "hello there"})).await;

    let mut streamed = String::new();
    loop {
        let event: Value = ws.receive_json().await;
        match event["type"].as_str() {
            Some("stream") => streamed.push_str(event["content"].as_str().unwrap()),
            Some("done") => {
                assert!(event["latency_s"].as_f64().unwrap() >= 0.0);
                break;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(streamed, "You said: hello there (0 earlier turns in view)");

    let sessions: Value = server.get("/api/sessions").await.json();
    assert_eq!(sessions.as_array().unwrap().len(), 1);

    ws.send_json(&json!({
        "restore_history": true,
        "history": [
            {"role": "user", "content": "earlier"},
            {"role": "assistant", "content": "reply"}
        ]
    }))
    .await;
    let event: Value = ws.receive_json().await;
    assert_eq!(event, json!({"type": "history_restored"}));

    ws.send_json(&json!({"cancel": true})).await;
    ws.send_json(&json!({"message": "again"})).await;
    let mut streamed = String::new();
    loop {
        let event: Value = ws.receive_json().await;
        match event["type"].as_str() {
            Some("stream") => streamed.push_str(event["content"].as_str().unwrap()),
            Some("done") => break,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(streamed, "You said: again (2 earlier turns in view)");
}
