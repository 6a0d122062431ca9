//! Immutable registry of generation configs.

use std::collections::HashMap;

use ragline_core::GenerationConfig;

use crate::ConfigError;

/// Ordered, validated set of [`GenerationConfig`]s with a designated default.
///
/// Built once at startup and shared read-only (typically behind an `Arc`).
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<GenerationConfig>,
    index: HashMap<String, usize>,
    default_id: String,
}

impl ModelRegistry {
    /// Validate and index `models`.
    pub fn new(
        models: Vec<GenerationConfig>,
        default_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let default_id = default_id.into();

        if models.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one model must be configured".into(),
            ));
        }

        let mut index = HashMap::with_capacity(models.len());
        for (i, model) in models.iter().enumerate() {
            if model.id.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "model #{} has an empty id",
                    i + 1
                )));
            }
            if model.backend.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "model '{}' has no backend",
                    model.id
                )));
            }
            if model.context_window == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "model '{}' must have context_window > 0",
                    model.id
                )));
            }
            if !(0.0..=2.0).contains(&model.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "model '{}' temperature must be between 0.0 and 2.0",
                    model.id
                )));
            }
            if index.insert(model.id.clone(), i).is_some() {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate model id '{}'",
                    model.id
                )));
            }
        }

        if !index.contains_key(&default_id) {
            return Err(ConfigError::ValidationError(format!(
                "default model '{default_id}' is not in the model list"
            )));
        }

        Ok(Self {
            models,
            index,
            default_id,
        })
    }

    pub fn get(&self, id: &str) -> Option<&GenerationConfig> {
        self.index.get(id).map(|&i| &self.models[i])
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn default_model(&self) -> &GenerationConfig {
        // The constructor guarantees the default is indexed.
        let i = self.index.get(&self.default_id).copied().unwrap_or(0);
        &self.models[i]
    }

    /// The requested model, or the default when none is named.
    pub fn resolve(&self, id: Option<&str>) -> Option<&GenerationConfig> {
        match id {
            Some(id) if !id.trim().is_empty() => self.get(id),
            _ => Some(self.default_model()),
        }
    }

    /// Models in configuration order.
    pub fn list(&self) -> &[GenerationConfig] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
