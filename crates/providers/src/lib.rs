//! Generation backend implementations for Ragline.
//!
//! All backends implement the `ragline_core::Backend` trait.
//! The dispatcher selects the correct backend for each generation config
//! and owns the timeout and retry policy.

pub mod anthropic;
pub mod dispatcher;
pub mod gemini;
pub mod http;
pub mod ollama;
pub mod openai;
pub mod router;

pub use anthropic::AnthropicBackend;
pub use dispatcher::{Dispatch, Dispatcher, RetryPolicy};
pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use router::build_from_config;
