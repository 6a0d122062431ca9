//! OpenAI-compatible chat completions backend.
//!
//! Works with OpenAI and any proxy speaking the same `/chat/completions`
//! dialect. The prompt goes in as a single user message behind a short
//! system message.

use async_trait::async_trait;
use ragline_core::{Backend, GenerationOptions, OUTPUT_LIMIT_KEYS, ProviderError};
use serde_json::{Value, json};
use tracing::debug;

use crate::http;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MAX_TOKENS: u64 = 4096;
const SYSTEM_MESSAGE: &str = "You are a helpful research assistant.";

pub struct OpenAiBackend {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            name: "openai".into(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            client: http::client(),
        }
    }

    /// Register under another backend identifier (e.g. a self-hosted proxy).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_body(prompt: &str, model_id: &str, options: &GenerationOptions) -> Value {
        let max_tokens = options.output_limit().unwrap_or(DEFAULT_MAX_TOKENS);

        let mut body = json!({
            "model": model_id,
            "messages": [
                {"role": "system", "content": SYSTEM_MESSAGE},
                {"role": "user", "content": prompt},
            ],
            "temperature": options.temperature,
            "max_tokens": max_tokens,
        });

        if let Some(obj) = body.as_object_mut() {
            for (key, value) in &options.extra {
                if !OUTPUT_LIMIT_KEYS.contains(&key.as_str()) {
                    obj.insert(key.clone(), value.clone());
                }
            }
        }
        body
    }

    pub fn parse_response(body: &Value) -> Result<String, ProviderError> {
        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                ProviderError::InvalidResponse(
                    "chat completion has no choices[0].message.content".into(),
                )
            })
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
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
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(prompt, model_id, options);

        debug!(backend = %self.name, model = %model_id, "Sending chat completion request");

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body);
        let response = http::send_json(&self.name, request).await?;
        Self::parse_response(&response)
    }
}
