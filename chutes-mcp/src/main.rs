use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chutes_mcp::{build_protocol, config::Settings, logging, AppState};
use chutes_mcp_core::{server::Server, transport::ServerSseTransport};
use clap::Parser;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Interface to listen on
    #[arg(long, env = "MCP_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "MCP_PORT", default_value_t = 8000)]
    port: u16,

    /// Settings document; `${VAR}` placeholders are filled from the environment
    #[arg(long, env = "CHUTES_MCP_CONFIG", default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` must be loaded before clap reads its env fallbacks.
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)
        .with_context(|| format!("failed to load settings from {}", cli.config.display()))?;
    logging::init(&settings)?;

    let state = Arc::new(AppState::new(settings)?);
    if state.client.api_token().is_none() {
        tracing::warn!("CHUTES_API_TOKEN is not set; generation tools will fail until it is");
    }
    if !state.uploader.is_configured() {
        tracing::info!("ImageKit is not configured; generated media will not be uploaded");
    }

    let protocol = build_protocol(state);
    tracing::info!("Starting Chutes MCP server on http://{}:{}/sse", cli.host, cli.port);
    let transport = ServerSseTransport::new(cli.host, cli.port, protocol);
    Server::start(transport).await
}
