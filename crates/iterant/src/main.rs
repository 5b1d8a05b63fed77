//! iterant runner
//!
//! Launches the configured tool host, runs one query through the controller
//! and prints the run report as JSON on stdout. Logs go to stderr.
//!
//! The query comes from the command-line arguments, or `ITERANT_QUERY`.

mod settings;

use std::process::ExitCode;

use anyhow::Context;
use iterant_core::controller::Phase;
use iterant_runtime::{OllamaGateway, StdioToolHost};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::settings::{Provider, RunnerSettings};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = RunnerSettings::from_env()?;
    let query = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let query = match (query.trim().is_empty(), &settings.query) {
        (false, _) => query,
        (true, Some(q)) => q.clone(),
        (true, None) => anyhow::bail!("no query given: pass it as arguments or set ITERANT_QUERY"),
    };

    let gateway = settings.gateway();
    tracing::info!(provider = gateway.name(), model = settings.model_name(), "generation gateway ready");
    if settings.provider == Provider::Ollama {
        let ollama = OllamaGateway::from_config(settings.ollama_config());
        if !ollama.health_check().await {
            tracing::warn!("Ollama not available, generation will fail");
            tracing::warn!("  Make sure Ollama is running: ollama serve");
        }
    }

    let controller = settings.controller(gateway)?;

    let mut host = StdioToolHost::open(&settings.host)
        .await
        .with_context(|| format!("could not start tool host '{}'", settings.host.program))?;

    tracing::info!(query = %query, "starting run");
    let report = controller.run(&mut host, &query).await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    match report.phase {
        Phase::Finalized => {
            tracing::info!(answer = report.answer.as_deref().unwrap_or_default(), "final answer");
            Ok(ExitCode::SUCCESS)
        }
        Phase::Exhausted => {
            tracing::warn!(iterations = report.iterations, "no final answer within the iteration budget");
            Ok(ExitCode::from(2))
        }
        _ => {
            let message = report
                .error
                .as_ref()
                .map_or_else(|| "run failed".to_string(), |e| e.user_message());
            tracing::error!("{}", message);
            Ok(ExitCode::FAILURE)
        }
    }
}
