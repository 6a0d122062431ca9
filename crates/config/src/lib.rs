//! Configuration loading, validation, and management for Ragline.
//!
//! Loads configuration from `ragline.toml` with environment variable
//! overrides. Validates all settings, including the model registry, at
//! startup.

mod registry;

pub use registry::ModelRegistry;

use ragline_core::GenerationConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ragline.toml";

/// The root configuration structure.
///
/// Maps directly to `ragline.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// JSON file holding the full document records
    #[serde(default = "default_documents_path")]
    pub documents_path: PathBuf,

    /// Registry id used when a request names no model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Generation configs, in display order
    #[serde(default = "default_models")]
    pub models: Vec<GenerationConfig>,

    /// Backend credentials and endpoints, keyed by backend identifier
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,

    /// Retrieval collaborator settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Timeout and retry policy for backend calls
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Prompt scaffolding
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Source citation settings
    #[serde(default)]
    pub sources: SourcesConfig,

    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_documents_path() -> PathBuf {
    PathBuf::from("data/documents.json")
}
fn default_model() -> String {
    "gemma3:4b".into()
}

fn default_models() -> Vec<GenerationConfig> {
    let mut local = GenerationConfig::new("gemma3:4b", "ollama", 8192)
        .with_option("num_predict", json!(1024));
    local.name = "Gemma 3 4B (local)".into();

    let mut openai = GenerationConfig::new("gpt-4o-mini", "openai", 128_000)
        .with_option("max_tokens", json!(4096));
    openai.name = "GPT-4o mini".into();

    let mut anthropic = GenerationConfig::new("claude-3-5-haiku-latest", "anthropic", 200_000)
        .with_option("maxOutputTokens", json!(1024));
    anthropic.name = "Claude 3.5 Haiku".into();

    let mut gemini = GenerationConfig::new("gemini-2.0-flash", "gemini", 1_048_576)
        .with_option("maxOutputTokens", json!(8192));
    gemini.name = "Gemini 2.0 Flash".into();

    vec![local, openai, anthropic, gemini]
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("documents_path", &self.documents_path)
            .field("default_model", &self.default_model)
            .field("models", &self.models)
            .field("backends", &self.backends)
            .field("retrieval", &self.retrieval)
            .field("dispatch", &self.dispatch)
            .field("prompt", &self.prompt)
            .field("sources", &self.sources)
            .field("gateway", &self.gateway)
            .finish()
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Per-backend credentials and endpoint.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

/// Which retrieval collaborator to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalKind {
    /// Lexical search over the loaded document store.
    Memory,
    /// Remote retrieval service over HTTP.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_kind")]
    pub kind: RetrievalKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Context windows at or above this size get `large_context_top_k` fragments
    #[serde(default = "default_large_context_threshold")]
    pub large_context_threshold: usize,

    #[serde(default = "default_large_context_top_k")]
    pub large_context_top_k: usize,
}

fn default_retrieval_kind() -> RetrievalKind {
    RetrievalKind::Memory
}
fn default_retrieval_timeout() -> u64 {
    30
}
fn default_top_k() -> usize {
    5
}
fn default_large_context_threshold() -> usize {
    100_000
}
fn default_large_context_top_k() -> usize {
    200
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            kind: default_retrieval_kind(),
            endpoint: None,
            timeout_secs: default_retrieval_timeout(),
            default_top_k: default_top_k(),
            large_context_threshold: default_large_context_threshold(),
            large_context_top_k: default_large_context_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Per-attempt timeout for a backend call
    #[serde(default = "default_dispatch_timeout")]
    pub timeout_secs: u64,

    /// Total attempts, including the first (at most 2 are made)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_dispatch_timeout() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    2
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_dispatch_timeout(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_instructions")]
    pub instructions: String,
}

pub fn default_instructions() -> String {
    "You are a helpful research assistant. Answer the user's question using only the \
     documents in the context below. Cite the documents you rely on by their title. \
     If the context does not contain enough information to answer, say so plainly."
        .into()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            instructions: default_instructions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Prefix for fallback links: `{link_base}{document_id}`
    #[serde(default = "default_link_base")]
    pub link_base: String,
}

fn default_link_base() -> String {
    "/documents/".into()
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            link_base: default_link_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    5000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, then apply process environment overrides.
    ///
    /// Environment variables:
    /// - `RAGLINE_MODEL` replaces `default_model`
    /// - `RAGLINE_DOCUMENTS` replaces `documents_path`
    /// - `OLLAMA_BASE_URL` fills `backends.ollama.api_url`
    /// - `OPENAI_API_KEY` / `EXTERNAL_API_KEY` fill `backends.openai.api_key`
    /// - `ANTHROPIC_API_KEY` fills `backends.anthropic.api_key`
    /// - `GEMINI_API_KEY` fills `backends.gemini.api_key`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Model and document path overrides always win. Credentials and URLs
    /// only fill gaps left by the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = get("RAGLINE_MODEL") {
            self.default_model = model;
        }
        if let Some(path) = get("RAGLINE_DOCUMENTS") {
            self.documents_path = PathBuf::from(path);
        }

        if let Some(url) = get("OLLAMA_BASE_URL") {
            let ollama = self.backends.entry("ollama".into()).or_default();
            if ollama.api_url.is_none() {
                ollama.api_url = Some(url);
            }
        }

        let keys = [
            ("openai", get("OPENAI_API_KEY").or_else(|| get("EXTERNAL_API_KEY"))),
            ("anthropic", get("ANTHROPIC_API_KEY")),
            ("gemini", get("GEMINI_API_KEY")),
        ];
        for (backend, key) in keys {
            if let Some(key) = key {
                let entry = self.backends.entry(backend.into()).or_default();
                if entry.api_key.is_none() {
                    entry.api_key = Some(key);
                }
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registry()?;

        if self.dispatch.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch.max_attempts must be at least 1".into(),
            ));
        }

        if self.dispatch.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch.timeout_secs must be > 0".into(),
            ));
        }

        if !(1..=200).contains(&self.retrieval.default_top_k) {
            return Err(ConfigError::ValidationError(
                "retrieval.default_top_k must be between 1 and 200".into(),
            ));
        }

        if self.retrieval.kind == RetrievalKind::Http && self.retrieval.endpoint.is_none() {
            return Err(ConfigError::ValidationError(
                "retrieval.endpoint is required when retrieval.kind = \"http\"".into(),
            ));
        }

        Ok(())
    }

    /// Build the immutable model registry.
    pub fn registry(&self) -> Result<ModelRegistry, ConfigError> {
        ModelRegistry::new(self.models.clone(), self.default_model.clone())
    }

    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.get(name)
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            documents_path: default_documents_path(),
            default_model: default_model(),
            models: default_models(),
            backends: HashMap::new(),
            retrieval: RetrievalConfig::default(),
            dispatch: DispatchConfig::default(),
            prompt: PromptConfig::default(),
            sources: SourcesConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
