use anyhow::Result;
use documcp::mcp::DocuMcp;
use rmcp::{ServiceExt, transport::stdio};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server = DocuMcp::try_new().inspect_err(|e| {
        error!("Failed to create server: {}", e);
    })?;
    info!(
        "Starting DocuMCP server on stdio (LLM assistance: {})",
        if server.context().is_llm_available() {
            "enabled"
        } else {
            "disabled"
        }
    );

    let service = server.serve(stdio()).await.inspect_err(|e| {
        error!("Error starting server: {}", e);
    })?;

    match service.waiting().await {
        Ok(reason) => info!("Server shut down: {:?}", reason),
        Err(e) => error!("Server error: {}", e),
    }

    Ok(())
}
