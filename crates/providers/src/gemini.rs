//! Google Gemini backend over the `generateContent` REST endpoint.

use async_trait::async_trait;
use ragline_core::{Backend, GenerationOptions, ProviderError};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::http;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiBackend {
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

    /// `models/{id}`, accepting ids that already carry the prefix.
    pub fn model_path(model_id: &str) -> String {
        if model_id.starts_with("models/") {
            model_id.to_string()
        } else {
            format!("models/{model_id}")
        }
    }

    /// Map registry options onto `generationConfig`.
    pub fn generation_config(options: &GenerationOptions) -> Value {
        let mut config = Map::new();
        config.insert("temperature".into(), json!(options.temperature));

        if let Some(n) = options.output_limit() {
            config.insert("maxOutputTokens".into(), json!(n));
        }
        if let Some(p) = options.get_f64("topP") {
            config.insert("topP".into(), json!(p));
        }
        if let Some(k) = options.get_u64("topK") {
            config.insert("topK".into(), json!(k));
        }
        if let Some(stops) = options.get("stopSequences").and_then(Value::as_array) {
            config.insert("stopSequences".into(), Value::Array(stops.clone()));
        }
        match options.get("thinkingBudget") {
            Some(v) if v.is_i64() || v.is_u64() => {
                config.insert("thinkingConfig".into(), json!({ "thinkingBudget": v }));
            }
            Some(v) => warn!(value = %v, "Ignoring non-integer thinkingBudget"),
            None => {}
        }

        Value::Object(config)
    }

    pub fn request_body(prompt: &str, options: &GenerationOptions) -> Value {
        json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": Self::generation_config(options),
        })
    }

    pub fn parse_response(body: &Value) -> Result<String, ProviderError> {
        if let Some(reason) = body
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
        {
            return Err(ProviderError::Blocked(reason.to_string()));
        }

        let parts = body
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                let finish = body
                    .pointer("/candidates/0/finishReason")
                    .and_then(Value::as_str)
                    .unwrap_or("N/A");
                ProviderError::InvalidResponse(format!(
                    "Gemini response has no content (finish reason: {finish})"
                ))
            })?;

        let text: String = parts
            .iter()
            .filter(|p| p.get("thought").and_then(Value::as_bool) != Some(true))
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect();

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
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
        let url = format!(
            "{}/v1beta/{}:generateContent",
            self.base_url,
            Self::model_path(model_id)
        );
        let body = Self::request_body(prompt, options);

        debug!(backend = "gemini", model = %model_id, "Sending generateContent request");

        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        let response = http::send_json("gemini", request).await?;
        Self::parse_response(&response)
    }
}
