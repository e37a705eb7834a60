//! Settings type definitions.
//!
//! Every section is camelCase on the wire and `#[serde(default)]`, so a
//! partial JSON file only needs the keys it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the embedding engine and its tools.
///
/// ```json
/// {
///   "store": { "databasePath": "/var/lib/lumen/embeddings.db" },
///   "embedding": { "model": "nomic-embed-text", "dimensions": 768 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LumenSettings {
    /// Embedding store backend.
    pub store: StoreSettings,
    /// Embedding provider.
    pub embedding: EmbeddingSettings,
    /// Bulk population run.
    pub populate: PopulateSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl LumenSettings {
    /// Reject values that deserialize fine but cannot drive the engine.
    pub fn validate(&self) -> Result<()> {
        if self.store.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "store.poolSize must be at least 1".into(),
            ));
        }
        if self.store.database_path.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "store.databasePath must not be empty".into(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(SettingsError::InvalidValue(
                "embedding.dimensions must be at least 1".into(),
            ));
        }
        if self.embedding.max_input_chars == 0 {
            return Err(SettingsError::InvalidValue(
                "embedding.maxInputChars must be at least 1".into(),
            ));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "embedding.model must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Backend storage and connection pool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Path of the database file. `:memory:` opens a private in-memory store.
    pub database_path: String,
    /// Upper bound on pooled connections.
    pub pool_size: u32,
    /// How long a caller waits for a free pooled connection.
    pub connection_timeout_ms: u64,
    /// How long a connection waits on a locked database.
    pub busy_timeout_ms: u64,
    /// Deadline for a single store operation.
    pub operation_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_path: "~/.lumen/embeddings.db".to_string(),
            pool_size: 8,
            connection_timeout_ms: 5_000,
            busy_timeout_ms: 5_000,
            operation_timeout_ms: 10_000,
        }
    }
}

/// Embedding provider endpoint and limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// Base URL of an `OpenAI`-compatible embeddings API.
    pub base_url: String,
    /// Model identifier sent to the provider and stored with every record.
    pub model: String,
    /// Fixed vector dimension D.
    pub dimensions: usize,
    /// Name of the environment variable holding the API key, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Deadline for a single provider call.
    pub timeout_ms: u64,
    /// Inputs longer than this many characters are truncated.
    pub max_input_chars: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            api_key_env: None,
            timeout_ms: 30_000,
            max_input_chars: 8_000,
        }
    }
}

/// Bulk population behaviour.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PopulateSettings {
    /// Pause between consecutive items.
    pub delay_ms: u64,
    /// Upstream feed of tasks to index.
    pub source_url: String,
}

impl Default for PopulateSettings {
    fn default() -> Self {
        Self {
            delay_ms: 100,
            source_url: "https://jsonplaceholder.typicode.com/todos".to_string(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = LumenSettings::default();
        assert_eq!(s.store.pool_size, 8);
        assert_eq!(s.store.busy_timeout_ms, 5_000);
        assert_eq!(s.embedding.dimensions, 768);
        assert_eq!(s.embedding.max_input_chars, 8_000);
        assert_eq!(s.populate.delay_ms, 100);
        assert_eq!(s.logging.level, "info");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn camel_case_wire_format() {
        let json = serde_json::to_value(LumenSettings::default()).unwrap();
        assert!(json["store"]["databasePath"].is_string());
        assert!(json["store"]["operationTimeoutMs"].is_u64());
        assert!(json["embedding"]["maxInputChars"].is_u64());
        assert!(json["embedding"].get("apiKeyEnv").is_none());
    }

    #[test]
    fn partial_section_keeps_defaults() {
        let s: LumenSettings =
            serde_json::from_str(r#"{"embedding": {"dimensions": 3}}"#).unwrap();
        assert_eq!(s.embedding.dimensions, 3);
        assert_eq!(s.embedding.model, "nomic-embed-text");
        assert_eq!(s.store, StoreSettings::default());
    }

    #[test]
    fn validate_rejects_zero_pool() {
        let mut s = LumenSettings::default();
        s.store.pool_size = 0;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("poolSize"));
    }

    #[test]
    fn validate_rejects_zero_dimensions() {
        let mut s = LumenSettings::default();
        s.embedding.dimensions = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_model() {
        let mut s = LumenSettings::default();
        s.embedding.model = "  ".into();
        assert!(s.validate().is_err());
    }
}
