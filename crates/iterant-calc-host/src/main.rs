//! Calculator tool host
//!
//! Speaks MCP on stdin/stdout; logs go to stderr so they never corrupt the
//! channel.

use iterant_calc_host::CalcServer;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let server = CalcServer::new();
    let names = server.tool_names();
    tracing::info!("Serving {} tools:", names.len());
    for name in &names {
        tracing::debug!("  • {}", name);
    }

    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "handshake failed"))?;
    let reason = service.waiting().await?;
    tracing::info!(?reason, "client disconnected, shutting down");

    Ok(())
}
