// ABOUTME: Entry point for streamclaw, a streaming LLM demo CLI with guardrails.
// ABOUTME: Parses CLI args, sets up logging, loads config, and runs one command.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use streamclaw::app::{App, Command};
use streamclaw::config::Config;

#[derive(Parser)]
#[command(name = "streamclaw", version, about = "Stream LLM replies with live aggregation and guardrails")]
struct Cli {
    /// Provider to use (openai, gemini, openrouter, ollama)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model to request
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("streamclaw=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?.with_overrides(cli.provider, cli.model);

    let mut app = App::new(config)?;
    app.run(cli.command).await
}
