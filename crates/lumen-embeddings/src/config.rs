//! Embedding configuration.

use std::time::Duration;

use lumen_settings::EmbeddingSettings;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;

/// Configuration for the embedding provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingConfig {
    /// Base URL of the embeddings API.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Vector dimension D.
    pub dimensions: usize,
    /// Environment variable that holds the API key.
    pub api_key_env: Option<String>,
    /// Per-call deadline in milliseconds.
    pub timeout_ms: u64,
    /// Truncation cap in characters.
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::from_settings(&EmbeddingSettings::default())
    }
}

impl EmbeddingConfig {
    /// Copy the embedding section of the settings.
    pub fn from_settings(s: &EmbeddingSettings) -> Self {
        Self {
            base_url: s.base_url.trim_end_matches('/').to_string(),
            model: s.model.clone(),
            dimensions: s.dimensions,
            api_key_env: s.api_key_env.clone(),
            timeout_ms: s.timeout_ms,
            max_input_chars: s.max_input_chars,
        }
    }

    /// Per-call deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Read the API key from the configured variable.
    ///
    /// `Ok(None)` when no variable is configured. An error when one is
    /// configured but unset or empty.
    pub fn resolve_api_key(&self) -> Result<Option<String>, ProviderError> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    pub(crate) fn resolve_api_key_with<F>(&self, lookup: F) -> Result<Option<String>, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(name) = self.api_key_env.as_deref() else {
            return Ok(None);
        };
        match lookup(name) {
            Some(key) if !key.trim().is_empty() => Ok(Some(key)),
            _ => Err(ProviderError::NotConfigured(format!("{name} is not set"))),
        }
    }
}
