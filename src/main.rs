//! Quizgen · Quiz Metadata Generation Backend
//!
//! - Axum HTTP API to trigger generation and inspect results
//! - Three-stage AI metadata pipeline (taxonomy → topic → prompt/title)
//! - Append-only JSONL log of every completion call
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : enables quiz generation if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   QUIZGEN_CONFIG_PATH : path to TOML config (generator settings + prompts)
//!   QUIZGEN_PROVIDER    : overrides generator.provider_id (only "openai" is served)
//!   QUIZGEN_MODEL       : overrides generator.model
//!   QUIZGEN_LOG_PATH    : JSONL completion log (in-memory if unset)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod cleanup;
mod completion;
mod completion_log;
mod config;
mod domain;
mod errors;
mod library;
mod metadata;
mod openai;
mod protocol;
mod routes;
mod state;
mod taxonomy;
mod telemetry;
mod util;

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = config::load_from_env()?;
  let addr = config.bind_addr;
  info!(
    target: "quizgen",
    provider = %config.generator.provider_id,
    model = %config.generator.model,
    temperature = config.generator.temperature,
    max_tokens = config.generator.max_tokens,
    timeout_secs = config.generator.timeout_secs,
    "Generator configured"
  );

  // Shared state: completion log, optional OpenAI-backed pipeline, quiz library.
  let state = Arc::new(AppState::new(config).await?);

  let app = build_router(state);

  let listener = TcpListener::bind(addr).await?;
  info!(target: "quizgen", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "quizgen", error = %e, "Failed to listen for shutdown signal");
    return;
  }
  info!(target: "quizgen", "Shutdown signal received");
}
