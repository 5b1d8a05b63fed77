//! Ollama Generation Gateway
//!
//! Implementation of `GenerationGateway` for local Ollama inference.

use async_trait::async_trait;
use iterant_core::error::{AgentError, Result};
use iterant_core::gateway::GenerationGateway;
use ollama_rs::{Ollama, generation::completion::request::GenerationRequest};

pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// Ollama gateway configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Model to generate with
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            model: DEFAULT_OLLAMA_MODEL.into(),
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost".into());
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(11434);

        Self {
            host,
            port,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Ollama gateway
pub struct OllamaGateway {
    client: Ollama,
    config: OllamaConfig,
}

impl OllamaGateway {
    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(&config.host, config.port),
            config,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_config(OllamaConfig::from_env())
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Whether the Ollama server answers at all
    pub async fn health_check(&self) -> bool {
        match self.client.list_local_models().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl GenerationGateway for OllamaGateway {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerationRequest::new(self.config.model.clone(), prompt.to_string());

        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| AgentError::Generation(e.to_string()))?;

        Ok(response.response)
    }
}
