use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use zerostick::agent::{AgentConfig, AgentController};
use zerostick::ollama::ChatClient;
use zerostick::server::{serve, AppState, ServerConfig};
use zerostick::tracing::{init_tracing, otlp_endpoint_from_env, shutdown_tracing};

/// WebSocket server streaming agent progress to a browser
#[derive(Parser, Debug)]
#[command(name = "zerostick-server", version, about)]
struct Cli {
    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Base URL clients use to fetch videos
    #[arg(long)]
    public_url: Option<String>,

    /// Directory generated programs run in and videos are served from
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Ollama model to use (overrides ZEROSTICK_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// OTLP collector endpoint (overrides OTEL_EXPORTER_OTLP_ENDPOINT)
    #[arg(long)]
    otlp_endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let otlp_endpoint = cli.otlp_endpoint.clone().or_else(otlp_endpoint_from_env);
    init_tracing("zerostick-server", otlp_endpoint.as_deref()).map_err(|e| e.to_string())?;

    let mut agent_config = AgentConfig::from_env();
    if let Some(model) = cli.model {
        agent_config.model = model;
    }
    if let Some(dir) = cli.working_dir {
        agent_config.working_dir = dir;
    }

    let server_config = ServerConfig {
        public_url: cli
            .public_url
            .unwrap_or_else(|| format!("http://localhost:{}", cli.port)),
        host: cli.host,
        port: cli.port,
        ..ServerConfig::default()
    };

    let controller = AgentController::with_ollama(ChatClient::from_env(), agent_config);
    let state = Arc::new(AppState::new(controller, server_config));

    let result = serve(state).await;
    shutdown_tracing();
    result?;
    Ok(())
}
