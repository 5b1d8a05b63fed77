//! Generation Gateway
//!
//! Common interface to the text-generation service. The controller only
//! sees [`GenerationGateway`]; Gemini, Ollama or a scripted test double all
//! plug in behind it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use iterant_core::gateway::{generate_with_timeout, GenerationGateway};
//!
//! let gateway: Arc<dyn GenerationGateway> = Arc::new(GeminiGateway::from_env());
//! let text = generate_with_timeout(gateway, prompt, Duration::from_secs(10)).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Default time to wait for one model reply
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Sampling settings passed through to the model service
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gemini-2.0-flash", "llama3.2")
    pub model: String,

    /// Temperature for sampling; `None` keeps the service default
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate; `None` keeps the service default
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl GenerationOptions {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Strategy trait for text-generation backends
///
/// Implementations only need to turn a prompt into text. Timeouts are
/// applied by [`generate_with_timeout`], so `generate` may block for as long
/// as the underlying client does.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Backend name for logs (e.g., "gemini")
    fn name(&self) -> &str;

    /// Send one prompt and return the raw reply text
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Run one generation on a worker task and stop waiting after `timeout`.
///
/// On timeout the worker is aborted, but an HTTP request already on the wire
/// may still be processed by the service.
pub async fn generate_with_timeout(
    gateway: Arc<dyn GenerationGateway>,
    prompt: String,
    timeout: Duration,
) -> Result<String> {
    let backend = gateway.name().to_string();
    tracing::debug!(%backend, prompt_len = prompt.len(), "starting generation");

    let worker = tokio::spawn(async move { gateway.generate(&prompt).await });
    let abort = worker.abort_handle();

    match tokio::time::timeout(timeout, worker).await {
        Ok(Ok(result)) => {
            if let Err(e) = &result {
                tracing::warn!(%backend, error = %e, "generation failed");
            }
            result
        }
        Ok(Err(join_error)) => Err(AgentError::Generation(format!(
            "generation worker stopped: {}",
            join_error
        ))),
        Err(_) => {
            tracing::warn!(%backend, timeout_secs = timeout.as_secs_f64(), "generation timed out");
            abort.abort();
            Err(AgentError::GenerationTimeout(timeout))
        }
    }
}
