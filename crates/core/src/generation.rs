//! Generation configs, requests, results, and the structured boundary error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorKind;
use crate::provider::OUTPUT_LIMIT_KEYS;
use crate::retrieval::Filters;

/// Reserved output estimate when neither the config nor its options say otherwise.
pub const DEFAULT_RESERVED_OUTPUT_TOKENS: usize = 1024;

/// One entry of the model registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Registry key, also what clients send as `model_name`.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Backend identifier (`ollama`, `openai`, `anthropic`, `gemini`).
    pub backend: String,

    /// Vendor model id sent to the backend; defaults to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Maximum total tokens (prompt + answer) the model accepts.
    pub context_window: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Backend-specific options, passed through to the vendor.
    #[serde(default)]
    pub options: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_output_tokens: Option<usize>,
}

fn default_temperature() -> f32 {
    0.3
}

impl GenerationConfig {
    pub fn new(id: impl Into<String>, backend: impl Into<String>, context_window: usize) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            backend: backend.into(),
            model: None,
            context_window,
            temperature: default_temperature(),
            options: Map::new(),
            reserved_output_tokens: None,
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn with_reserved_output_tokens(mut self, tokens: usize) -> Self {
        self.reserved_output_tokens = Some(tokens);
        self
    }

    /// The model id the backend should be asked for.
    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.id)
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }

    /// Tokens held back for the answer. The dispatcher sends this as the backend's output cap.
    pub fn reserved_output_tokens(&self) -> usize {
        if let Some(tokens) = self.reserved_output_tokens {
            return tokens;
        }
        OUTPUT_LIMIT_KEYS
            .iter()
            .find_map(|key| self.options.get(*key).and_then(Value::as_u64))
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_RESERVED_OUTPUT_TOKENS)
    }

    /// Largest prompt this config accepts.
    pub fn prompt_limit(&self) -> usize {
        self.context_window
            .saturating_sub(self.reserved_output_tokens())
    }
}

/// An incoming query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub query: String,

    /// Registry id of the GenerationConfig to use; the default model when absent.
    #[serde(default, alias = "backend_config_id", skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    #[serde(default)]
    pub filters: Filters,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl GenerationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }
}

/// A cited source in a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Document id.
    pub id: String,
    pub fragment_id: String,
    pub title: String,
    pub source: String,
    pub date: String,
    pub snippet: String,
    pub link: String,
    pub score: f32,
}

/// A successful answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub answer: String,
    pub sources: Vec<Source>,
    /// Wall-clock seconds from request start to answer return.
    pub query_time: f64,
    pub prompt_token_count: usize,
    pub answer_token_count: usize,
    pub model_id: String,
    /// Ids of the documents placed in the context, in context order.
    #[serde(default)]
    pub document_ids: Vec<String>,
}

/// Working stages of a request, in the only order they may be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Retrieving,
    Assembling,
    Prompting,
    Dispatching,
    Generating,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Retrieving => "retrieving",
            Self::Assembling => "assembling",
            Self::Prompting => "prompting",
            Self::Dispatching => "dispatching",
            Self::Generating => "generating",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure returned at the request boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} during {stage}: {message}")]
pub struct QueryFailure {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

impl QueryFailure {
    pub fn new(stage: Stage, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }

    /// Classify a domain error raised while in `stage`.
    pub fn from_error(stage: Stage, err: &crate::error::Error) -> Self {
        Self::new(stage, err.kind(), err.to_string())
    }
}
