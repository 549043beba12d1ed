//! Server module - HTTP front-end for the assistant
//!
//! Routes:
//! - `POST /api/ask` answers `{ "message", "session"? }` with `{ "response" }`
//!   or `{ "error", "kind" }`
//! - `GET /api/tools` lists the tool catalog
//! - `GET /health` liveness probe

pub mod handlers;

pub use handlers::{AskRequest, AskResponse, ErrorResponse, DEFAULT_SESSION};

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::agent::AgentLoop;
use crate::error::Result;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<AgentLoop>,
}

impl AppState {
    pub fn new(agent: Arc<AgentLoop>) -> Self {
        Self { agent }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/ask", post(handlers::ask))
        .route("/api/tools", get(handlers::list_tools))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `bind` until `shutdown` is cancelled.
pub async fn serve(agent: Arc<AgentLoop>, bind: &str, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %listener.local_addr()?, "API server listening");

    axum::serve(listener, router(AppState::new(agent)))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}
