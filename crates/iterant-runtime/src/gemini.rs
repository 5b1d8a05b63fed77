//! Gemini Generation Gateway
//!
//! Calls the `generateContent` REST endpoint with a single user turn.

use async_trait::async_trait;
use iterant_core::error::{AgentError, Result};
use iterant_core::gateway::{GenerationGateway, GenerationOptions};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini gateway configuration
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// API key; a missing key fails the first generation, not construction
    pub api_key: Option<String>,

    /// Service root, overridable for proxies
    pub base_url: String,

    pub options: GenerationOptions,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.into(),
            options: GenerationOptions::for_model(DEFAULT_GEMINI_MODEL),
        }
    }
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty());
        let base_url = std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.into());

        Self {
            api_key,
            base_url,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.options.model = model.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.options.model
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(prompt: &'a str, options: &GenerationOptions) -> Self {
        let generation_config = (options.temperature.is_some() || options.max_tokens.is_some()).then(|| GenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_tokens,
        });

        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config,
        }
    }
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts concatenated and trimmed
    fn into_text(self) -> Result<String> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".into());
            return Err(AgentError::Generation(format!("Gemini returned no reply: {reason}")));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "empty content".into());
            return Err(AgentError::Generation(format!("Gemini returned no text: {reason}")));
        }
        Ok(text.to_string())
    }
}

/// Gemini REST gateway
pub struct GeminiGateway {
    client: Client,
    config: GeminiConfig,
}

impl GeminiGateway {
    pub fn from_config(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_config(GeminiConfig::from_env())
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }
}

#[async_trait]
impl GenerationGateway for GeminiGateway {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| AgentError::Generation("GEMINI_API_KEY is not set".into()))?;

        let response = self
            .client
            .post(self.config.endpoint())
            .header(API_KEY_HEADER, api_key)
            .json(&GenerateContentRequest::new(prompt, &self.config.options))
            .send()
            .await
            .map_err(|e| AgentError::Generation(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Generation(format!("Gemini returned {status}: {body}")));
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| AgentError::Generation(format!("Gemini response decode failed: {e}")))?
            .into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint() {
        let config = GeminiConfig {
            base_url: "http://localhost:8080/".into(),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_request_body() {
        let body = serde_json::to_value(GenerateContentRequest::new(
            "Query: 2+2",
            &GenerationOptions::for_model("m"),
        ))
        .unwrap();
        assert_eq!(
            body,
            json!({"contents": [{"role": "user", "parts": [{"text": "Query: 2+2"}]}]})
        );

        let mut options = GenerationOptions::for_model("m");
        options.temperature = Some(0.0);
        let body = serde_json::to_value(GenerateContentRequest::new("x", &options)).unwrap();
        assert_eq!(body["generationConfig"], json!({"temperature": 0.0}));
    }

    #[test]
    fn test_reply_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "FUNCTION_CALL: "}, {"text": "add|5|3"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "FUNCTION_CALL: add|5|3");
    }

    #[test]
    fn test_blocked_prompt() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        let err = response.into_text().unwrap_err();
        assert!(matches!(err, AgentError::Generation(ref m) if m.contains("SAFETY")));
    }

    #[tokio::test]
    async fn test_missing_key_fails_generation() {
        let gateway = GeminiGateway::from_config(GeminiConfig::default());
        let err = gateway.generate("hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Generation(ref m) if m.contains("GEMINI_API_KEY")));
    }
}
