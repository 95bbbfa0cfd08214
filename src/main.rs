//! Streaming chat session relay server
//!
//! Entry point: loads configuration, builds the generation engine and serves
//! WebSocket chat sessions.

use std::sync::Arc;

use anyhow::Context;
use mimalloc::MiMalloc;

use chat_session_relay::{config::AppConfig, llm, server, telemetry};

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenvy::dotenv();

    let config = AppConfig::load().context("failed to load configuration")?;

    // Initialize tracing (M-LOG-STRUCTURED)
    telemetry::init(config.log.format);

    let engine = llm::build_engine(&config.engine).context("failed to build generation engine")?;

    server::start_server(Arc::new(config), engine).await
}
