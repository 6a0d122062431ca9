//! Backend trait: the abstraction over text generation services.
//!
//! A Backend knows how to turn a prompt into answer text on one vendor API.
//! Every variant exposes the same two operations, so the dispatcher never
//! needs to know which vendor it is talking to.
//!
//! Implementations: Ollama (local), OpenAI-compatible, Anthropic, Gemini.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;

/// Option keys naming an answer-length cap, in precedence order.
pub const OUTPUT_LIMIT_KEYS: [&str; 3] = ["maxOutputTokens", "max_tokens", "num_predict"];

/// Options passed to a single `generate` call.
///
/// `temperature` is always present. Everything else is vendor-specific and
/// travels in `extra`, keyed the way the model registry spells it
/// (`maxOutputTokens`, `num_predict`, `topP`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,

    /// Answer-length cap set by the dispatcher from the model's output reservation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: None,
            extra: Map::new(),
        }
    }
}

impl GenerationOptions {
    pub fn new(temperature: f32) -> Self {
        Self {
            temperature,
            max_output_tokens: None,
            extra: Map::new(),
        }
    }

    /// Overlay a registry options map. A `temperature` key in the map wins.
    pub fn with_overrides(mut self, options: &Map<String, Value>) -> Self {
        for (key, value) in options {
            if key == "temperature" {
                if let Some(t) = value.as_f64() {
                    self.temperature = t as f32;
                }
                continue;
            }
            self.extra.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u64) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Answer-length cap: the explicit cap, else the first limit key present.
    pub fn output_limit(&self) -> Option<u64> {
        self.max_output_tokens
            .or_else(|| OUTPUT_LIMIT_KEYS.iter().find_map(|key| self.get_u64(key)))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.extra.get(key).and_then(Value::as_u64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(Value::as_f64)
    }
}

/// The core Backend trait.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend identifier as used in the model registry (`ollama`, `openai`, ...).
    fn name(&self) -> &str;

    /// Cheap local check that credentials are present. Must not touch the network.
    fn validate_credentials(&self) -> bool;

    /// Generate answer text for `prompt` with the given vendor model.
    async fn generate(
        &self,
        prompt: &str,
        model_id: &str,
        options: &GenerationOptions,
    ) -> std::result::Result<String, ProviderError>;
}
