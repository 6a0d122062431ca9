//! Backend construction from configuration.

use std::sync::Arc;

use ragline_config::{AppConfig, BackendConfig};
use ragline_core::Backend;
use tracing::{debug, warn};

use crate::anthropic::AnthropicBackend;
use crate::dispatcher::{Dispatcher, RetryPolicy};
use crate::gemini::GeminiBackend;
use crate::ollama::OllamaBackend;
use crate::openai::OpenAiBackend;

/// Backends that are always registered, configured or not.
pub const BUILTIN_BACKENDS: [&str; 4] = ["ollama", "openai", "anthropic", "gemini"];

/// Build a dispatcher with every built-in backend plus any extra
/// OpenAI-compatible backends declared under `[backends.<name>]`.
///
/// Backends without a key are still registered; dispatching to them fails
/// fast with an auth error. An extra backend needs an explicit `api_url`
/// and is skipped without one.
pub fn build_from_config(config: &AppConfig) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(RetryPolicy::from(&config.dispatch));

    for name in BUILTIN_BACKENDS {
        let backend_config = config.backend(name).cloned().unwrap_or_default();
        dispatcher.register(build_backend(name, &backend_config));
    }

    for (name, backend_config) in &config.backends {
        if BUILTIN_BACKENDS.contains(&name.as_str()) {
            continue;
        }
        let Some(url) = backend_config.api_url.as_deref() else {
            warn!(backend = %name, "Skipping OpenAI-compatible backend without api_url");
            continue;
        };
        debug!(backend = %name, url, "Registering OpenAI-compatible backend");
        let key = backend_config.api_key.clone().unwrap_or_default();
        dispatcher.register(Arc::new(OpenAiBackend::new(key, Some(url)).with_name(name.as_str())));
    }

    dispatcher
}

fn build_backend(name: &str, config: &BackendConfig) -> Arc<dyn Backend> {
    let key = config.api_key.clone().unwrap_or_default();
    let url = config.api_url.as_deref();
    match name {
        "ollama" => Arc::new(OllamaBackend::new(url)),
        "anthropic" => Arc::new(AnthropicBackend::new(key, url)),
        "gemini" => Arc::new(GeminiBackend::new(key, url)),
        _ => Arc::new(OpenAiBackend::new(key, url)),
    }
}
