//! agent-relay: Agent Relay Main Binary
//!
//! Main entry point for the agent relay application.
//!
//! Usage:
//!   agent-relay                    - Start server mode (HTTP API + session sweeper)
//!   agent-relay -i, --interactive  - Start interactive CLI client
//!   agent-relay -e <prompt>        - Send one prompt and print the streamed reply
//!   agent-relay --help             - Show help

mod cli;
mod client;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use relay_api::AppState;
use relay_core::{Config, EventRelay, SessionStore, Sweeper, SweeperConfig};
use tracing_subscriber::EnvFilter;

use crate::client::ClientConfig;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Server mode (HTTP API + session sweeper)
    Server,
    /// Interactive CLI client
    Interactive,
    /// Send one prompt and exit
    Execute(String),
    /// Read one prompt from a file and exit
    File(PathBuf),
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = parse_args(&args);

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("agent-relay {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize logging; client modes stay quiet unless RUST_LOG asks otherwise
    let default_directive = if mode == RunMode::Server { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_directive.parse()?))
        .with_writer(std::io::stderr)
        .init();

    match mode {
        RunMode::Server => {
            let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;
            run_server(config).await
        }
        RunMode::Interactive => cli::run_interactive(ClientConfig::from_env()).await,
        RunMode::Execute(prompt) => cli::run_execute(ClientConfig::from_env(), &prompt).await,
        RunMode::File(path) => cli::run_file(ClientConfig::from_env(), &path).await,
        RunMode::Help | RunMode::Version => Ok(()),
    }
}

/// Parse command line arguments
fn parse_args(args: &[String]) -> RunMode {
    let mut words = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--interactive" | "-i" => return RunMode::Interactive,
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            "--execute" | "-e" => {
                let prompt: Vec<&str> = iter.by_ref().map(String::as_str).collect();
                return RunMode::Execute(prompt.join(" "));
            }
            "--file" | "-f" => {
                return match iter.next() {
                    Some(path) => RunMode::File(PathBuf::from(path)),
                    None => RunMode::Help,
                };
            }
            other if other.starts_with('-') => {}
            word => words.push(word),
        }
    }

    if words.is_empty() {
        RunMode::Server
    } else {
        RunMode::Execute(words.join(" "))
    }
}

/// Print help message
fn print_help() {
    println!("agent-relay - Streaming HTTP relay for a conversational agent");
    println!();
    println!("Usage:");
    println!("  agent-relay                     Start server mode (HTTP API + session sweeper)");
    println!("  agent-relay -i, --interactive   Start interactive CLI client");
    println!("  agent-relay -e, --execute <p>   Send one prompt to the server and print the reply");
    println!("  agent-relay <prompt>            Same as --execute");
    println!("  agent-relay -f, --file <path>   Send the contents of a file as the prompt");
    println!("  agent-relay --help              Show this help message");
    println!("  agent-relay --version           Show version");
    println!();
    println!("Server Environment Variables:");
    println!("  API_PORT / PORT              HTTP API port (default: 3000)");
    println!("  AGENT_API_KEY / API_KEY      Required API key (unset: no auth)");
    println!("  API_ALLOWED_ORIGINS          Comma-separated CORS origins (unset: any)");
    println!("  SESSION_MAX_IDLE_SECS        Idle time before a session is evicted (default: 3600)");
    println!("  SESSION_SWEEP_INTERVAL_SECS  Eviction sweep period (default: 300)");
    println!("  SESSION_STRICT_IDS           Reject unknown client session ids (default: false)");
    println!("  AGENT_COMMAND                Agent CLI executable (default: claude)");
    println!("  AGENT_ARGS                   Arguments placed before the agent flags");
    println!("  AGENT_MODEL                  Default model");
    println!("  AGENT_MAX_TURNS              Maximum agent turns per run");
    println!("  AGENT_CWD                    Working directory for the agent");
    println!("  AGENT_MCP_URL                Default MCP server endpoint");
    println!("  AGENT_MCP_API_KEY            API key for the default MCP server");
    println!();
    println!("Client Environment Variables:");
    println!("  AGENT_API_URL                Server URL (default: http://localhost:3000)");
    println!("  AGENT_API_KEY                API key sent as X-API-Key");
}

/// Run server mode (HTTP API + session sweeper)
async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting agent-relay...");
    tracing::info!(
        command = %config.agent.command,
        model = config.agent.model.as_deref().unwrap_or("default"),
        mcp_servers = config.mcp.servers.len(),
        "Agent runtime configured"
    );

    let store = SessionStore::new();
    let relay = EventRelay::from_config(&config);

    // Start idle session sweeper
    let sweeper = Arc::new(Sweeper::new(store.clone(), SweeperConfig::from(&config.session)));
    let sweeper_handle = Arc::clone(&sweeper).start();

    // Start HTTP API server
    let api_port = config.api.port;
    let state = AppState::new(config, store, relay);
    let api_handle = tokio::spawn(async move {
        if let Err(e) = relay_api::start_server(state).await {
            tracing::error!("HTTP API error: {}", e);
        }
    });
    tracing::info!("HTTP API server started on port {}", api_port);

    tracing::info!("agent-relay initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    api_handle.abort();
    sweeper_handle.stop().await;

    tracing::info!(
        evicted_total = sweeper.evicted_total(),
        "Shutdown complete"
    );
    Ok(())
}
