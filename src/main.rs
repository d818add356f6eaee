use clap::Parser;

use zerostick::agent::{AgentConfig, AgentController, ConsoleSink};
use zerostick::ollama::ChatClient;
use zerostick::tracing::{init_tracing, otlp_endpoint_from_env, shutdown_tracing};

/// Stickman video generation agent
#[derive(Parser, Debug)]
#[command(name = "zerostick", version, about)]
struct Cli {
    /// The animation prompt (e.g., 'Make a stickman jump')
    #[arg(default_value = "Make a stickman waving his hand")]
    prompt: String,

    /// Ollama model to use (overrides ZEROSTICK_MODEL, default deepseek-r1:14b)
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let otlp_endpoint = otlp_endpoint_from_env();
    init_tracing("zerostick", otlp_endpoint.as_deref()).map_err(|e| e.to_string())?;

    let mut config = AgentConfig::from_env();
    if let Some(model) = cli.model {
        config.model = model;
    }

    println!("Welcome to the Zero-Cost Stickman Agent.");
    println!("Goal: {}", cli.prompt);
    println!("Model: {}", config.model);
    println!("------------------------------------------");

    let controller = AgentController::with_ollama(ChatClient::from_env(), config);
    let report = controller.run(&cli.prompt, &ConsoleSink).await;

    println!(
        "[DONE] {} after {} turn(s), {} execution(s)",
        report.outcome.label(),
        report.turns,
        report.executions
    );

    shutdown_tracing();
    Ok(())
}
