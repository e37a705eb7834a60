//! `OpenAI`-compatible HTTP embedding backend.
//!
//! Sends `POST {base_url}/embeddings` with `{"model", "input"}` and reads the
//! first vector from `data`. Works with hosted APIs and local servers that
//! speak the same shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::errors::ProviderError;
use crate::service::EmbeddingService;

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Embedding service backed by an HTTP API.
pub struct HttpEmbeddingService {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    api_key: Option<String>,
    request_dimensions: bool,
}

impl HttpEmbeddingService {
    /// Build from config, resolving the API key from the environment.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let api_key = config.resolve_api_key()?;
        Ok(Self::new(config, api_key))
    }

    /// Build from config with an explicit API key.
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dimensions,
            api_key,
            request_dimensions: false,
        }
    }

    /// Ask the server to shorten vectors to the configured dimension. Only
    /// models that support output truncation accept this.
    pub fn with_requested_dimensions(mut self, enabled: bool) -> Self {
        self.request_dimensions = enabled;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = EmbeddingsRequest {
            model: &self.model,
            input: text,
            dimensions: self.request_dimensions.then_some(self.dims),
        };
        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(model = %self.model, chars = text.chars().count(), "requesting embedding");
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok());
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::MalformedResponse("response has no data".into()))
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
