//! Runner Settings
//!
//! Everything the runner needs, read from the environment (after `.env` is
//! loaded).

use std::sync::Arc;
use std::time::Duration;

use iterant_core::controller::{CompletionStep, ControllerBuilder, DEFAULT_MAX_ITERATIONS};
use iterant_core::gateway::{DEFAULT_GENERATION_TIMEOUT, GenerationGateway, GenerationOptions};
use iterant_core::{AgentError, Controller, Result};
use iterant_runtime::gemini::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, GeminiConfig, GeminiGateway};
use iterant_runtime::ollama::{DEFAULT_OLLAMA_MODEL, OllamaConfig, OllamaGateway};
use iterant_runtime::HostCommand;

pub const DEFAULT_HOST_COMMAND: &str = "iterant-calc-host";

/// Model service backing the run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    Ollama,
}

impl Provider {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "ollama" => Ok(Provider::Ollama),
            other => Err(AgentError::Config(format!(
                "ITERANT_PROVIDER must be 'gemini' or 'ollama', got '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunnerSettings {
    pub provider: Provider,
    pub model: Option<String>,
    pub max_iterations: usize,
    pub generation_timeout: Duration,
    pub host: HostCommand,
    pub query: Option<String>,
    pub completion_steps: Vec<CompletionStep>,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub ollama_host: String,
    pub ollama_port: u16,
}

impl RunnerSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = get("ITERANT_PROVIDER")
            .map(|p| Provider::parse(&p))
            .transpose()?
            .unwrap_or(Provider::Gemini);

        let max_iterations = match get("ITERANT_MAX_ITERATIONS") {
            Some(raw) => parse_number::<usize>("ITERANT_MAX_ITERATIONS", &raw)?,
            None => DEFAULT_MAX_ITERATIONS,
        };

        let generation_timeout = match get("ITERANT_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number::<u64>("ITERANT_TIMEOUT_SECS", &raw)?),
            None => DEFAULT_GENERATION_TIMEOUT,
        };

        let host = HostCommand::new(get("ITERANT_HOST_COMMAND").unwrap_or_else(|| DEFAULT_HOST_COMMAND.into()))
            .args(get("ITERANT_HOST_ARGS").unwrap_or_default().split_whitespace());

        let completion_steps = match get("ITERANT_COMPLETION_STEPS") {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| AgentError::Config(format!("ITERANT_COMPLETION_STEPS is not a valid step list: {e}")))?,
            None => Vec::new(),
        };

        let ollama_port = match get("OLLAMA_PORT") {
            Some(raw) => parse_number::<u16>("OLLAMA_PORT", &raw)?,
            None => 11434,
        };

        Ok(Self {
            provider,
            model: get("ITERANT_MODEL"),
            max_iterations,
            generation_timeout,
            host,
            query: get("ITERANT_QUERY"),
            completion_steps,
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.into()),
            ollama_host: get("OLLAMA_HOST").unwrap_or_else(|| "http://localhost".into()),
            ollama_port,
        })
    }

    /// Model name, falling back to the provider default
    pub fn model_name(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model,
            (None, Provider::Gemini) => DEFAULT_GEMINI_MODEL,
            (None, Provider::Ollama) => DEFAULT_OLLAMA_MODEL,
        }
    }

    pub fn gateway(&self) -> Arc<dyn GenerationGateway> {
        match self.provider {
            Provider::Gemini => Arc::new(GeminiGateway::from_config(GeminiConfig {
                api_key: self.gemini_api_key.clone(),
                base_url: self.gemini_base_url.clone(),
                options: GenerationOptions::for_model(self.model_name()),
            })),
            Provider::Ollama => Arc::new(OllamaGateway::from_config(self.ollama_config())),
        }
    }

    /// Ollama endpoint and model; the gateway and its health check share it
    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            host: self.ollama_host.clone(),
            port: self.ollama_port,
            model: self.model_name().to_string(),
        }
    }

    pub fn controller(&self, gateway: Arc<dyn GenerationGateway>) -> Result<Controller> {
        ControllerBuilder::new()
            .gateway(gateway)
            .max_iterations(self.max_iterations)
            .generation_timeout(self.generation_timeout)
            .completion_steps(self.completion_steps.clone())
            .build()
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AgentError::Config(format!("{key} must be a non-negative integer, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<RunnerSettings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RunnerSettings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.provider, Provider::Gemini);
        assert_eq!(s.model_name(), "gemini-2.0-flash");
        assert_eq!(s.max_iterations, 3);
        assert_eq!(s.generation_timeout, Duration::from_secs(10));
        assert_eq!(s.host.program, "iterant-calc-host");
        assert!(s.host.args.is_empty());
        assert!(s.query.is_none());
        assert!(s.completion_steps.is_empty());
        assert_eq!(s.ollama_port, 11434);
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("ITERANT_PROVIDER", "Ollama"),
            ("ITERANT_MAX_ITERATIONS", "6"),
            ("ITERANT_TIMEOUT_SECS", "30"),
            ("ITERANT_HOST_COMMAND", "python"),
            ("ITERANT_HOST_ARGS", "tools.py  --quiet"),
            ("ITERANT_QUERY", "What is 2 + 2?"),
            ("OLLAMA_PORT", "11500"),
        ])
        .unwrap();
        assert_eq!(s.provider, Provider::Ollama);
        assert_eq!(s.model_name(), "llama3.2");
        assert_eq!(s.max_iterations, 6);
        assert_eq!(s.generation_timeout, Duration::from_secs(30));
        assert_eq!(s.host.args, ["tools.py", "--quiet"]);
        assert_eq!(s.query.as_deref(), Some("What is 2 + 2?"));
        assert_eq!(s.ollama_port, 11500);
        assert_eq!(s.gateway().name(), "ollama");

        let ollama = s.ollama_config();
        assert_eq!(ollama.host, "http://localhost");
        assert_eq!(ollama.port, 11500);
        assert_eq!(ollama.model, "llama3.2");
    }

    #[test]
    fn test_completion_steps_json() {
        let s = settings(&[(
            "ITERANT_COMPLETION_STEPS",
            r#"[{"tool": "open_paint", "settle_ms": 500}, {"tool": "add_text_in_paint", "arguments": {"text": "{answer}"}}]"#,
        )])
        .unwrap();
        assert_eq!(s.completion_steps.len(), 2);
        assert_eq!(s.completion_steps[0].settle_ms, 500);
        assert_eq!(s.completion_steps[1].arguments["text"], "{answer}");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(settings(&[("ITERANT_PROVIDER", "openai")]), Err(AgentError::Config(_))));
        assert!(matches!(settings(&[("ITERANT_MAX_ITERATIONS", "three")]), Err(AgentError::Config(_))));
        assert!(matches!(settings(&[("ITERANT_COMPLETION_STEPS", "[{")]), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_blank_values_fall_back() {
        let s = settings(&[("ITERANT_MODEL", "  "), ("ITERANT_PROVIDER", "")]).unwrap();
        assert_eq!(s.model_name(), "gemini-2.0-flash");
    }

    #[test]
    fn test_zero_timeout_rejected_by_builder() {
        let s = settings(&[("ITERANT_TIMEOUT_SECS", "0")]).unwrap();
        assert!(s.controller(s.gateway()).is_err());
    }
}
