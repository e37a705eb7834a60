//! Similarity search engine: the entry point callers use.
//!
//! Composes an [`EmbeddingProvider`] and an [`EmbeddingStore`]. Indexing
//! embeds first and writes only on success. Searching validates, embeds the
//! query, and runs one store read. Store calls run on the blocking pool
//! under a per-operation deadline so they never stall the async runtime.

use std::time::Duration;

use chrono::{DateTime, Utc};
use lumen_settings::StoreSettings;
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::{EmbeddingError, Result, StoreError, ValidationError};
use crate::provider::EmbeddingProvider;
use crate::store::{
    Collection, EmbeddingRecord, EmbeddingStore, Metadata, NewRecord, QueryFilter, ScoredRecord,
    SimilarityQuery, StoreStats,
};
use crate::text::{new_content_key, profile_key, task_source_text};

/// Default number of results per search.
pub const DEFAULT_LIMIT: usize = 10;

/// Engine-level configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Deadline for each store operation.
    pub operation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&StoreSettings::default())
    }
}

impl EngineConfig {
    /// Build from the store settings section.
    pub fn from_settings(s: &StoreSettings) -> Self {
        Self {
            operation_timeout: Duration::from_millis(s.operation_timeout_ms),
        }
    }
}

/// Options for a search.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchOptions {
    /// Restrict to one owner.
    pub owner_id: Option<i64>,
    /// Maximum results. Zero yields none.
    pub limit: usize,
    /// Minimum similarity in `[-1, 1]`.
    pub threshold: f32,
    /// Extra predicates.
    pub filters: Vec<QueryFilter>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            owner_id: None,
            limit: DEFAULT_LIMIT,
            threshold: 0.0,
            filters: Vec::new(),
        }
    }
}

/// One search result.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Record key.
    pub key: String,
    /// Owning user.
    pub owner_id: i64,
    /// Text the record was embedded from.
    pub source_text: String,
    /// Opaque metadata.
    pub metadata: Metadata,
    /// Cosine similarity to the query.
    pub similarity: f32,
    /// When the record was first written.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
    /// Content type, for content hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Profile version, for profile hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_version: Option<i64>,
}

impl From<ScoredRecord> for SearchHit {
    fn from(scored: ScoredRecord) -> Self {
        let r = scored.record;
        Self {
            key: r.key,
            owner_id: r.owner_id,
            source_text: r.source_text,
            metadata: r.metadata,
            similarity: scored.similarity,
            created_at: r.created_at,
            updated_at: r.updated_at,
            content_type: r.content_type,
            profile_version: r.profile_version,
        }
    }
}

/// Semantic indexing and search over tasks, content, and profiles.
#[derive(Clone, Debug)]
pub struct SimilaritySearchEngine {
    provider: EmbeddingProvider,
    store: EmbeddingStore,
    operation_timeout: Duration,
}

impl SimilaritySearchEngine {
    /// Compose an engine. Provider and store must agree on D.
    pub fn new(
        provider: EmbeddingProvider,
        store: EmbeddingStore,
        config: &EngineConfig,
    ) -> Result<Self> {
        if provider.dimensions() != store.dimensions() {
            return Err(ValidationError::DimensionMismatch {
                expected: store.dimensions(),
                actual: provider.dimensions(),
            }
            .into());
        }
        Ok(Self {
            provider,
            store,
            operation_timeout: config.operation_timeout,
        })
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &EmbeddingProvider {
        &self.provider
    }

    /// The wrapped store.
    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    // ── Indexing ────────────────────────────────────────────────────

    /// Embed and store a task under `task_id`, replacing any previous
    /// version. The embedded text is the task text followed by its status.
    ///
    /// A [`StoreError::Timeout`] does not mean the write was dropped; it may
    /// still commit. Retrying is safe since the upsert is keyed.
    pub async fn index_task(
        &self,
        task_id: &str,
        owner_id: i64,
        task_text: &str,
        completed: bool,
        metadata: Metadata,
    ) -> Result<EmbeddingRecord> {
        if task_id.is_empty() {
            return Err(ValidationError::EmptyKey.into());
        }
        if task_text.trim().is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        let source_text = task_source_text(task_text, completed);
        self.index(Indexed {
            collection: Collection::Task,
            key: task_id.to_string(),
            owner_id,
            source_text,
            metadata,
            content_type: None,
            profile_version: None,
        })
        .await
    }

    /// Embed and store a piece of content under a freshly generated key.
    ///
    /// The key is new on every call, so a retry after [`StoreError::Timeout`]
    /// can leave a second record if the first write committed late.
    pub async fn index_content(
        &self,
        owner_id: i64,
        content_type: &str,
        text: &str,
        metadata: Metadata,
    ) -> Result<EmbeddingRecord> {
        if content_type.trim().is_empty() {
            return Err(ValidationError::MissingField {
                collection: Collection::Content,
                field: "content_type",
            }
            .into());
        }
        self.index(Indexed {
            collection: Collection::Content,
            key: new_content_key(),
            owner_id,
            source_text: text.to_string(),
            metadata,
            content_type: Some(content_type.to_string()),
            profile_version: None,
        })
        .await
    }

    /// Embed and store a profile summary, one record per user and version.
    ///
    /// As with [`SimilaritySearchEngine::index_task`], a timed-out write may
    /// still commit and retrying is safe.
    pub async fn index_profile(
        &self,
        user_id: i64,
        profile_version: i64,
        summary: &str,
        metadata: Metadata,
    ) -> Result<EmbeddingRecord> {
        self.index(Indexed {
            collection: Collection::Profile,
            key: profile_key(user_id, profile_version),
            owner_id: user_id,
            source_text: summary.to_string(),
            metadata,
            content_type: None,
            profile_version: Some(profile_version),
        })
        .await
    }

    async fn index(&self, item: Indexed) -> Result<EmbeddingRecord> {
        let source_text = self.provider.prepare(&item.source_text)?;
        let vector = self.provider.embed(&source_text).await?;
        let model_id = self.provider.model_id().to_string();

        let record = self
            .blocking("upsert", move |store| {
                store.upsert(&NewRecord {
                    collection: item.collection,
                    key: &item.key,
                    owner_id: item.owner_id,
                    source_text: &source_text,
                    vector: &vector,
                    model_id: &model_id,
                    metadata: &item.metadata,
                    content_type: item.content_type.as_deref(),
                    profile_version: item.profile_version,
                })
            })
            .await?;

        info!(
            collection = %record.collection,
            key = %record.key,
            owner_id = record.owner_id,
            "indexed embedding"
        );
        Ok(record)
    }

    // ── Search ──────────────────────────────────────────────────────

    /// Tasks most similar to `query`.
    pub async fn search_tasks(
        &self,
        query: &str,
        owner_id: Option<i64>,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        let options = SearchOptions {
            owner_id,
            limit,
            threshold,
            filters: Vec::new(),
        };
        self.search(Collection::Task, query, options).await
    }

    /// Content most similar to `query`, optionally of one content type.
    pub async fn search_content(
        &self,
        query: &str,
        owner_id: Option<i64>,
        content_type: Option<&str>,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        let options = SearchOptions {
            owner_id,
            limit,
            threshold,
            filters: content_type
                .map(|t| vec![QueryFilter::ContentType(t.to_string())])
                .unwrap_or_default(),
        };
        self.search(Collection::Content, query, options).await
    }

    /// Profiles most similar to `query`.
    pub async fn search_profiles(
        &self,
        query: &str,
        owner_id: Option<i64>,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        let options = SearchOptions {
            owner_id,
            limit,
            threshold,
            ..SearchOptions::default()
        };
        self.search(Collection::Profile, query, options).await
    }

    /// Search any collection with full options.
    pub async fn search(
        &self,
        collection: Collection,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let threshold = options.threshold;
        if !(threshold.is_finite() && (-1.0..=1.0).contains(&threshold)) {
            return Err(ValidationError::InvalidThreshold(f64::from(threshold)).into());
        }
        if options.limit == 0 {
            return Ok(Vec::new());
        }

        let vector = self.provider.embed(query).await?;
        let SearchOptions {
            owner_id,
            limit,
            threshold,
            filters,
        } = options;

        let scored = self
            .blocking("query", move |store| {
                store.query(&SimilarityQuery {
                    collection,
                    vector: &vector,
                    owner_id,
                    limit,
                    threshold,
                    filters: &filters,
                })
            })
            .await?;

        debug!(
            collection = %collection,
            owner_id = ?owner_id,
            hits = scored.len(),
            "search complete"
        );
        Ok(scored.into_iter().map(SearchHit::from).collect())
    }

    // ── Maintenance ─────────────────────────────────────────────────

    /// Fetch one record by key.
    pub async fn get(&self, collection: Collection, key: &str) -> Result<Option<EmbeddingRecord>> {
        let key = key.to_string();
        self.blocking("get", move |store| store.get(collection, &key))
            .await
    }

    /// Delete one record. Returns whether it existed.
    pub async fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.blocking("delete", move |store| store.delete(collection, &key))
            .await
    }

    /// Record counts per collection.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.blocking("stats", |store| store.stats()).await
    }

    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&EmbeddingStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        let handle = tokio::task::spawn_blocking(move || f(&store));
        match tokio::time::timeout(self.operation_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(StoreError::Join(join.to_string()).into()),
            Err(_) => Err(EmbeddingError::from(StoreError::Timeout {
                op,
                after_ms: u64::try_from(self.operation_timeout.as_millis()).unwrap_or(u64::MAX),
            })),
        }
    }
}

struct Indexed {
    collection: Collection,
    key: String,
    owner_id: i64,
    source_text: String,
    metadata: Metadata,
    content_type: Option<String>,
    profile_version: Option<i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
