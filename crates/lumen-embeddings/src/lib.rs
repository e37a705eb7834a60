//! # lumen-embeddings
//!
//! Embedding store and semantic search over tasks, content, and user
//! profiles.
//!
//! - [`provider`]: checked front end to an embedding backend
//!   ([`http::HttpEmbeddingService`] or [`service::MockEmbeddingService`])
//! - [`codec`]: fixed-dimension vector encoding and vector math
//! - [`store`]: `SQLite` persistence with an in-database cosine distance
//! - [`engine`]: index and search operations, the entry point for callers
//! - [`populate`]: throttled sequential bulk indexing

#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod engine;
pub mod errors;
pub mod http;
pub mod populate;
pub mod provider;
pub mod service;
pub mod store;
pub mod text;

pub use codec::VectorCodec;
pub use config::EmbeddingConfig;
pub use engine::{EngineConfig, SearchHit, SearchOptions, SimilaritySearchEngine};
pub use errors::{EmbeddingError, ProviderError, Result, StoreError, ValidationError};
pub use http::HttpEmbeddingService;
pub use populate::{BulkPopulator, ItemFailure, PopulateItem, PopulateReport};
pub use provider::EmbeddingProvider;
pub use service::{EmbeddingService, MockEmbeddingService};
pub use store::{Collection, EmbeddingRecord, EmbeddingStore, Metadata, QueryFilter, open_store};
