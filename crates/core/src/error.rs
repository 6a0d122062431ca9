//! Error types for the Ragline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them so the orchestrator can classify any failure into an
//! [`ErrorKind`] at the request boundary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all Ragline operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Generation backends ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Retrieval collaborator ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Document store ---
    #[error("Document store error: {0}")]
    DocumentStore(#[from] DocumentStoreError),

    // --- Configuration ---
    #[error("Configuration error: {0}")]
    Configuration(String),

    // --- Prompt budget ---
    #[error("Context overflow: prompt needs {prompt_tokens} tokens but only {limit} are available")]
    ContextOverflow { prompt_tokens: usize, limit: usize },

    // --- Request validation ---
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Classify this error into the boundary taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider(e) => e.kind(),
            Self::Retrieval(_) => ErrorKind::Retrieval,
            Self::DocumentStore(DocumentStoreError::NotFound(_)) => ErrorKind::DocumentNotFound,
            Self::DocumentStore(_) => ErrorKind::Configuration,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::ContextOverflow { .. } => ErrorKind::ContextOverflow,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// The unified failure taxonomy surfaced at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[serde(rename = "retrieval_error")]
    Retrieval,
    DocumentNotFound,
    ContextOverflow,
    #[serde(rename = "auth_error")]
    Auth,
    #[serde(rename = "configuration_error")]
    Configuration,
    #[serde(rename = "rate_limit_error")]
    RateLimit,
    #[serde(rename = "timeout_error")]
    Timeout,
    #[serde(rename = "provider_error")]
    Provider,
    InvalidRequest,
}

impl ErrorKind {
    /// Stable snake_case label, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retrieval => "retrieval_error",
            Self::DocumentNotFound => "document_not_found",
            Self::ContextOverflow => "context_overflow",
            Self::Auth => "auth_error",
            Self::Configuration => "configuration_error",
            Self::RateLimit => "rate_limit_error",
            Self::Timeout => "timeout_error",
            Self::Provider => "provider_error",
            Self::InvalidRequest => "invalid_request",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Bounded context errors ---

/// Failures raised by a generation backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limited by provider{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Content blocked by provider: {0}")]
    Blocked(String),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    }
}

impl ProviderError {
    /// Map onto the four-way backend taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthenticationFailed(_) => ErrorKind::Auth,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::ApiError { .. }
            | Self::Network(_)
            | Self::InvalidResponse(_)
            | Self::Blocked(_) => ErrorKind::Provider,
        }
    }

    /// Only timeouts and rate limits are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::RateLimit)
    }
}

/// Failures raised by the retrieval collaborator.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Retrieval service unavailable: {0}")]
    Unavailable(String),

    #[error("Retrieval timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid retrieval response: {0}")]
    InvalidResponse(String),
}

/// Failures loading or reading the document store.
#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("Failed to read documents at {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse documents at {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid document set: {0}")]
    Invalid(String),

    #[error("Document not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 500,
            message: "Internal Server Error".into(),
        });
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("Internal Server Error"));
    }

    #[test]
    fn rate_limit_display_includes_hint() {
        let with = ProviderError::RateLimited {
            retry_after_secs: Some(7),
        };
        let without = ProviderError::RateLimited {
            retry_after_secs: None,
        };
        assert!(with.to_string().contains("retry after 7s"));
        assert_eq!(without.to_string(), "Rate limited by provider");
    }

    #[test]
    fn provider_errors_classify_into_four_kinds() {
        assert_eq!(
            ProviderError::AuthenticationFailed("bad key".into()).kind(),
            ErrorKind::Auth
        );
        assert_eq!(
            ProviderError::RateLimited {
                retry_after_secs: None
            }
            .kind(),
            ErrorKind::RateLimit
        );
        assert_eq!(ProviderError::Timeout("slow".into()).kind(), ErrorKind::Timeout);
        assert_eq!(ProviderError::Network("refused".into()).kind(), ErrorKind::Provider);
        assert_eq!(ProviderError::Blocked("SAFETY".into()).kind(), ErrorKind::Provider);
    }

    #[test]
    fn only_timeouts_and_rate_limits_are_transient() {
        assert!(ProviderError::Timeout("t".into()).is_transient());
        assert!(
            ProviderError::RateLimited {
                retry_after_secs: Some(1)
            }
            .is_transient()
        );
        assert!(!ProviderError::AuthenticationFailed("x".into()).is_transient());
        assert!(
            !ProviderError::ApiError {
                status_code: 503,
                message: String::new()
            }
            .is_transient()
        );
    }

    #[test]
    fn top_level_kinds() {
        assert_eq!(
            Error::from(RetrievalError::Timeout(30)).kind(),
            ErrorKind::Retrieval
        );
        assert_eq!(
            Error::from(DocumentStoreError::NotFound("doc".into())).kind(),
            ErrorKind::DocumentNotFound
        );
        assert_eq!(
            Error::ContextOverflow {
                prompt_tokens: 10,
                limit: 5
            }
            .kind(),
            ErrorKind::ContextOverflow
        );
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RateLimit).unwrap();
        assert_eq!(json, "\"rate_limit_error\"");
        let json = serde_json::to_string(&ErrorKind::DocumentNotFound).unwrap();
        assert_eq!(json, "\"document_not_found\"");
        assert_eq!(ErrorKind::Auth.to_string(), "auth_error");
    }
}
