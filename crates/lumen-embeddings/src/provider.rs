//! Embedding provider: turns caller text into checked vectors.
//!
//! Wraps an [`EmbeddingService`] with the rules every caller relies on:
//! blank input is refused before any model call, long input is truncated
//! deterministically, each call has a deadline, and a response is accepted
//! only if it has exactly D finite components.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::codec::VectorCodec;
use crate::config::EmbeddingConfig;
use crate::errors::{EmbeddingError, ProviderError, Result, ValidationError};
use crate::service::EmbeddingService;
use crate::text::prepare_input;

/// Checked front end to an embedding backend. Cheap to clone.
#[derive(Clone)]
pub struct EmbeddingProvider {
    service: Arc<dyn EmbeddingService>,
    codec: VectorCodec,
    max_input_chars: usize,
    timeout: Duration,
}

impl std::fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingProvider")
            .field("model_id", &self.service.model_id())
            .field("dimensions", &self.codec.dimensions())
            .field("max_input_chars", &self.max_input_chars)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl EmbeddingProvider {
    /// Wrap `service` with the limits from `config`.
    pub fn new(service: Arc<dyn EmbeddingService>, config: &EmbeddingConfig) -> Self {
        Self::with_limits(service, config.max_input_chars, config.timeout())
    }

    /// Wrap `service` with explicit limits.
    pub fn with_limits(
        service: Arc<dyn EmbeddingService>,
        max_input_chars: usize,
        timeout: Duration,
    ) -> Self {
        let codec = VectorCodec::new(service.dimensions());
        Self {
            service,
            codec,
            max_input_chars: max_input_chars.max(1),
            timeout,
        }
    }

    /// Model identifier stored with every vector.
    pub fn model_id(&self) -> &str {
        self.service.model_id()
    }

    /// Vector dimension D.
    pub fn dimensions(&self) -> usize {
        self.codec.dimensions()
    }

    /// Whether the backend can take requests.
    pub fn is_ready(&self) -> bool {
        self.service.is_ready()
    }

    /// The exact text [`EmbeddingProvider::embed`] sends for `text`: trimmed
    /// and capped at the character limit.
    pub fn prepare(&self, text: &str) -> Result<String> {
        prepare_input(text, self.max_input_chars).ok_or_else(|| ValidationError::EmptyText.into())
    }

    /// Embed one text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = self.prepare(text)?;
        let original_chars = text.trim().chars().count();
        if original_chars > self.max_input_chars {
            debug!(
                original_chars,
                max_chars = self.max_input_chars,
                "truncating embedding input"
            );
        }

        let vector = tokio::time::timeout(self.timeout, self.service.embed_single(&input))
            .await
            .map_err(|_| ProviderError::Timeout {
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })??;

        self.codec.validate(&vector).map_err(|e| {
            warn!(model = self.model_id(), error = %e, "provider returned unusable vector");
            ProviderError::MalformedResponse(e.to_string())
        })?;
        Ok(vector)
    }

    /// Embed several texts, one provider call each, in order.
    ///
    /// Stops at the first failure and reports its position.
    pub async fn embed_all<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            let vector = self
                .embed(text.as_ref())
                .await
                .map_err(|source| EmbeddingError::BatchItem {
                    index,
                    source: Box::new(source),
                })?;
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
