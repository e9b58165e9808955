// crates/ctxmem-server/src/main.rs
// Context Memory Engine: durable conversational memory for AI agents.

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env from ~/.context-memory/.env only (never from CWD).
    if let Some(home) = dirs::home_dir() {
        if let Err(e) = dotenvy::from_path(home.join(".context-memory/.env")) {
            tracing::debug!("no global .env file loaded: {e}");
        }
    }

    let cli = Cli::parse();

    // Quiet by default: stdout is reserved for the MCP JSON-RPC stream, so
    // all logging goes to stderr (§6 "stdout/stderr discipline") at WARN,
    // raised via `CTXMEM_LOG`/`RUST_LOG` for debugging (§10).
    let env_filter = std::env::var("CTXMEM_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        None | Some(Commands::Serve) => {
            if let Err(e) = cli::run_mcp_server().await {
                tracing::error!("fatal initialization error: {e:#}");
                std::process::exit(1);
            }
        }
        Some(Commands::Tool { name, args }) => {
            let service = cli::serve::init_context_service().await?;
            cli::run_tool(service, name, args).await?;
        }
    }

    Ok(())
}
