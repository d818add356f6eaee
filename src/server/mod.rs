//! WebSocket front end for the agent
//!
//! Serves:
//! - `GET /ws` - one prompt at a time per connection; progress events are
//!   relayed as JSON frames while the run is in flight
//! - `GET /videos/*` - files from the agent working directory
//! - `GET /metrics` - Prometheus text format
//!
//! # Protocol
//!
//! ```text
//! → {"type": "prompt", "content": "Make a stickman jump"}
//! ← {"type": "status", "content": "Agent started..."}
//! ← ... every event of the run, in order ...
//! ← {"type": "video", "url": "http://localhost:8000/videos/jump.mp4"}
//! ← {"type": "status", "content": "Video created: jump.mp4"}
//! ```

pub mod session;

use std::sync::Arc;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;

use crate::agent::{AgentController, Executor};
use crate::artifacts::DEFAULT_ARTIFACT_EXTENSION;
use crate::metrics;
use crate::ollama::Generator;

pub use session::{handle_text, InboundMessage};

/// Configuration for the WebSocket server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL observers use to fetch artifacts (no trailing slash needed)
    pub public_url: String,
    /// Extension of media files announced after a run
    pub artifact_extension: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            public_url: "http://localhost:8000".to_string(),
            artifact_extension: DEFAULT_ARTIFACT_EXTENSION.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shared server state
pub struct AppState<G, E> {
    pub controller: Arc<AgentController<G, E>>,
    pub config: ServerConfig,
    /// Serializes runs against the shared working directory. Held across the
    /// run and the artifact scan that follows it.
    pub run_lock: Mutex<()>,
}

impl<G, E> AppState<G, E> {
    pub fn new(controller: AgentController<G, E>, config: ServerConfig) -> Self {
        Self {
            controller: Arc::new(controller),
            config,
            run_lock: Mutex::new(()),
        }
    }
}

/// Error type for server startup
#[derive(Debug)]
pub enum ServerError {
    Bind { addr: String, source: std::io::Error },
    Serve(std::io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind { addr, source } => write!(f, "Failed to bind {}: {}", addr, source),
            ServerError::Serve(e) => write!(f, "Server error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

/// Build the application router
pub fn create_router<G, E>(state: Arc<AppState<G, E>>) -> Router
where
    G: Generator + 'static,
    E: Executor + 'static,
{
    let videos = ServeDir::new(state.controller.config().working_dir.clone());

    Router::new()
        .route("/ws", get(ws_handler::<G, E>))
        .route("/metrics", get(metrics_handler))
        .nest_service("/videos", videos)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ws_handler<G, E>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<G, E>>>,
) -> impl IntoResponse
where
    G: Generator + 'static,
    E: Executor + 'static,
{
    ws.on_upgrade(move |socket: WebSocket| session::run_connection(socket, state))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

/// Bind and serve until Ctrl+C.
pub async fn serve<G, E>(state: Arc<AppState<G, E>>) -> Result<(), ServerError>
where
    G: Generator + 'static,
    E: Executor + 'static,
{
    let addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!(
        addr = %addr,
        working_dir = %state.controller.config().working_dir.display(),
        "Agent server listening"
    );

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
