//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly (not OpenAI-compatible proxy).
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field, split off the assembled prompt

use async_trait::async_trait;
use ragline_core::{Backend, GenerationOptions, ProviderError};
use serde_json::{Value, json};
use tracing::debug;

use crate::http;

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u64 = 1024;
const QUESTION_MARKER: &str = "\n\nUser question:";
const FALLBACK_SYSTEM_PROMPT: &str =
    "You are a helpful research assistant. Answer the question based on the provided context.";

/// Anthropic Messages API backend.
pub struct AnthropicBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            client: http::client(),
        }
    }

    /// Split an assembled prompt into `(system, user)`.
    ///
    /// Everything before the question marker is instructions and context.
    pub fn split_prompt(prompt: &str) -> (String, String) {
        match prompt.split_once(QUESTION_MARKER) {
            Some((system, question)) => {
                let system = system.trim();
                let system = if system.is_empty() {
                    FALLBACK_SYSTEM_PROMPT.to_string()
                } else {
                    system.to_string()
                };
                (system, format!("User question: {}", question.trim()))
            }
            None => (FALLBACK_SYSTEM_PROMPT.to_string(), prompt.to_string()),
        }
    }

    pub fn request_body(prompt: &str, model_id: &str, options: &GenerationOptions) -> Value {
        let (system, user) = Self::split_prompt(prompt);
        let max_tokens = options.output_limit().unwrap_or(DEFAULT_MAX_TOKENS);

        json!({
            "model": model_id,
            "system": system,
            "messages": [{"role": "user", "content": user}],
            "max_tokens": max_tokens,
            "temperature": options.temperature,
        })
    }

    /// Concatenate every text block of the reply.
    pub fn parse_response(body: &Value) -> Result<String, ProviderError> {
        let blocks = body
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("Anthropic response has no content array".into())
            })?;

        let text: String = blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect();

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn validate_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    async fn generate(
        &self,
        prompt: &str,
        model_id: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::request_body(prompt, model_id, options);

        debug!(backend = "anthropic", model = %model_id, "Sending messages request");

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        let response = http::send_json("anthropic", request).await?;
        Self::parse_response(&response)
    }
}
