use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::Serialize;
use std::sync::Arc;

use tower_http::trace::TraceLayer;

use tracing::{debug, info, warn};

use crate::AppState;
use crate::config::AppConfig;
use crate::error::SessionError;
use crate::llm::GenerationEngine;
use crate::protocol::{ClientEvent, EventSink, ServerEvent};
use crate::session::{Session, SessionInfo, SessionRegistry, SessionSettings};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/sessions", get(list_sessions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(
    config: Arc<AppConfig>,
    engine: Arc<dyn GenerationEngine>,
) -> anyhow::Result<()> {
    info!(
        name: "engine.ready",
        engine = engine.name(),
        history_window = config.session.history_window,
        overlap_policy = ?config.session.overlap_policy,
        "Generation engine ready"
    );

    let state = AppState {
        engine,
        sessions: SessionRegistry::new(),
        config: Arc::clone(&config),
    };
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(name: "server.stopping", "Shutdown signal received");
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// GET /ws - Upgrade to a chat session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Outbound half of a WebSocket, one JSON text frame per event.
struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait::async_trait]
impl EventSink for WsSink {
    async fn send_event(&mut self, event: ServerEvent) -> Result<(), SessionError> {
        self.0
            .send(Message::Text(event.to_json().into()))
            .await
            .map_err(|e| SessionError::SendFailure(e.to_string()))
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let info = state.sessions.register();
    let (sender, mut receiver) = socket.split();
    let mut sink = WsSink(sender);

    let mut session = Session::new(
        info.id.clone(),
        Arc::clone(&state.engine),
        SessionSettings::from_config(&state.config),
    );

    let session_id = info.id.clone();
    let inbound = async_stream::stream! {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => match ClientEvent::parse(text.as_str()) {
                    Ok(event) => {
                        yield event;
                    }
                    Err(e) => {
                        debug!(session_id = %session_id, error = %e, "Ignoring inbound frame");
                    }
                },
                Ok(Message::Close(frame)) => {
                    info!(
                        session_id = %session_id,
                        code = ?frame.as_ref().map(|f| f.code),
                        "Client closed connection"
                    );
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "WebSocket receive failed");
                    break;
                }
            }
        }
    };
    futures::pin_mut!(inbound);

    session.run(inbound, &mut sink).await;
    state.sessions.remove(&info.id);
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    engine: String,
    active_sessions: usize,
}

/// GET /health - Liveness plus live session count.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        engine: state.engine.name().to_string(),
        active_sessions: state.sessions.len(),
    })
}

/// GET /api/sessions - Connected sessions, oldest first.
async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.sessions.list())
}
