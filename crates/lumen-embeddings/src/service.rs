//! Embedding backends.
//!
//! [`EmbeddingService`] is the raw model call. Input preparation, deadlines,
//! and response checks live in [`crate::provider::EmbeddingProvider`], which
//! wraps any service.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::codec::l2_normalize;
use crate::errors::ProviderError;

/// A model that turns one text into one vector.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a single prepared text.
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Identifier recorded with every stored vector.
    fn model_id(&self) -> &str;

    /// Length of every vector this service returns.
    fn dimensions(&self) -> usize;

    /// Whether the service can take requests.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Deterministic offline service.
///
/// Vectors are derived from SHA-256 digests of the text, so equal texts give
/// equal unit vectors and different texts almost surely differ. Useful for
/// dry runs and tests; similarities carry no meaning.
pub struct MockEmbeddingService {
    dims: usize,
    model_id: String,
    ready: AtomicBool,
}

impl MockEmbeddingService {
    /// Mock service with the given dimension.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            model_id: "mock-sha256".to_string(),
            ready: AtomicBool::new(true),
        }
    }

    /// Toggle readiness. A service that is not ready refuses requests.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut v = Vec::with_capacity(self.dims);
        let mut block: u32 = 0;
        while v.len() < self.dims {
            let digest = Sha256::new()
                .chain_update(block.to_le_bytes())
                .chain_update(text.as_bytes())
                .finalize();
            let scaled = digest.iter().map(|b| (f32::from(*b) / 127.5) - 1.0);
            v.extend(scaled.take(self.dims - v.len()));
            block += 1;
        }
        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl EmbeddingService for MockEmbeddingService {
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if !self.is_ready() {
            return Err(ProviderError::NotConfigured("mock service disabled".into()));
        }
        Ok(self.hash_to_vector(text))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
