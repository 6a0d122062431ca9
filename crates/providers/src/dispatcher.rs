//! Provider dispatcher: backend registry plus bounded retries.
//!
//! Every call is resolved against the registry, credential-checked without
//! touching the network, then run under a per-attempt timeout. Only
//! transient failures (timeouts and rate limits) earn another attempt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ragline_config::DispatchConfig;
use ragline_core::{Backend, Error, GenerationConfig, GenerationOptions, ProviderError};
use tokio::time::Instant;
use tracing::{info, warn};

/// Hard bound on attempts per call, whatever the config asks for.
pub const MAX_ATTEMPTS: u32 = 2;

/// Timeout and retry settings for backend calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_attempts: config.max_attempts.clamp(1, MAX_ATTEMPTS),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Wait before attempt `failed + 1`, after `failed` failures.
    ///
    /// `base * 2^(failed - 1)`, raised to the rate-limit hint when there is
    /// one, and never above `max_backoff`.
    pub fn backoff(&self, failed: u32, error: &ProviderError) -> Duration {
        let exp = failed.saturating_sub(1).min(16);
        let mut wait = self.backoff_base.saturating_mul(1u32 << exp);
        if let ProviderError::RateLimited {
            retry_after_secs: Some(secs),
        } = error
        {
            wait = wait.max(Duration::from_secs(*secs));
        }
        wait.min(self.max_backoff)
    }
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub text: String,
    pub backend: String,
    pub attempts: u32,
    pub latency: Duration,
}

/// Routes generation calls to the backend named by a [`GenerationConfig`].
pub struct Dispatcher {
    backends: HashMap<String, Arc<dyn Backend>>,
    policy: RetryPolicy,
}

impl Dispatcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            backends: HashMap::new(),
            policy,
        }
    }

    /// Register a backend under its own name.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Credential status per registered backend, sorted by name.
    pub fn credential_report(&self) -> Vec<(String, bool)> {
        let mut report: Vec<(String, bool)> = self
            .backends
            .iter()
            .map(|(name, backend)| (name.clone(), backend.validate_credentials()))
            .collect();
        report.sort_by(|a, b| a.0.cmp(&b.0));
        report
    }

    /// Resolve and credential-check the backend for `config`.
    ///
    /// Never touches the network.
    pub fn resolve(&self, config: &GenerationConfig) -> Result<Arc<dyn Backend>, Error> {
        let backend = self.get(&config.backend).ok_or_else(|| {
            Error::Configuration(format!(
                "model '{}' uses unknown backend '{}'",
                config.id, config.backend
            ))
        })?;

        if !backend.validate_credentials() {
            warn!(backend = %config.backend, "Credentials missing, refusing to dispatch");
            return Err(ProviderError::AuthenticationFailed(format!(
                "no credentials configured for backend '{}'",
                config.backend
            ))
            .into());
        }

        Ok(backend)
    }

    /// Run `prompt` on an already resolved backend with timeouts and retries.
    pub async fn generate(
        &self,
        backend: &dyn Backend,
        config: &GenerationConfig,
        prompt: &str,
    ) -> Result<Dispatch, Error> {
        let options = GenerationOptions::new(config.temperature)
            .with_overrides(&config.options)
            .with_max_output_tokens(config.reserved_output_tokens() as u64);
        let model_id = config.model_id();
        let name = backend.name().to_string();
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.clamp(1, MAX_ATTEMPTS);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            info!(
                backend = %name,
                model = %model_id,
                attempt,
                max_attempts,
                "Dispatching generation"
            );

            let result =
                match tokio::time::timeout(self.policy.timeout, backend.generate(prompt, model_id, &options))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(format!(
                        "backend '{}' did not answer within {}s",
                        name,
                        self.policy.timeout.as_secs()
                    ))),
                };

            match result {
                Ok(text) => {
                    let latency = started.elapsed();
                    info!(
                        backend = %name,
                        attempts = attempt,
                        latency_ms = latency.as_millis() as u64,
                        "Generation completed"
                    );
                    return Ok(Dispatch {
                        text,
                        backend: name,
                        attempts: attempt,
                        latency,
                    });
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let wait = self.policy.backoff(attempt, &e);
                    warn!(
                        backend = %name,
                        attempt,
                        error = %e,
                        backoff_ms = wait.as_millis() as u64,
                        "Transient backend failure, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    warn!(
                        backend = %name,
                        attempts = attempt,
                        latency_ms = started.elapsed().as_millis() as u64,
                        error = %e,
                        "Generation failed"
                    );
                    return Err(e.into());
                }
            }
        }
    }

    /// Resolve, check credentials, and generate in one step.
    pub async fn dispatch(&self, config: &GenerationConfig, prompt: &str) -> Result<Dispatch, Error> {
        let backend = self.resolve(config)?;
        self.generate(backend.as_ref(), config, prompt).await
    }
}
