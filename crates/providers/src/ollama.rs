//! Ollama backend (locally hosted model server).
//!
//! Uses the native `/api/generate` endpoint in non-streaming mode. No
//! credentials are involved.

use async_trait::async_trait;
use ragline_core::{Backend, GenerationOptions, OUTPUT_LIMIT_KEYS, ProviderError};
use serde_json::{Value, json};
use tracing::debug;

use crate::http;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaBackend {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: http::client(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the `/api/generate` body. Every option travels in `options`,
    /// with the output cap spelled `num_predict`.
    pub fn request_body(prompt: &str, model_id: &str, options: &GenerationOptions) -> Value {
        let mut opts = options.extra.clone();
        for key in OUTPUT_LIMIT_KEYS {
            opts.remove(key);
        }
        if let Some(n) = options.output_limit() {
            opts.insert("num_predict".into(), json!(n));
        }
        opts.insert("temperature".into(), json!(options.temperature));
        json!({
            "model": model_id,
            "prompt": prompt,
            "stream": false,
            "options": opts,
        })
    }

    pub fn parse_response(body: &Value) -> Result<String, ProviderError> {
        body.get("response")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("Ollama response has no 'response' field".into())
            })
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn validate_credentials(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        prompt: &str,
        model_id: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = Self::request_body(prompt, model_id, options);

        debug!(backend = "ollama", model = %model_id, "Sending generate request");

        let response = http::send_json("ollama", self.client.post(&url).json(&body)).await?;
        Self::parse_response(&response)
    }
}
