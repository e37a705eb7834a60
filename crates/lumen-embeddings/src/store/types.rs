//! Record, query, and result types for the embedding store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque string-keyed metadata stored alongside a record. The store keeps
/// it verbatim and never interprets it beyond equality filters.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// The three record collections, each with its own table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Task embeddings keyed by task id.
    Task,
    /// Free-form content embeddings keyed `content_<uuid>`.
    Content,
    /// User-profile embeddings keyed `<user_id>:<version>`.
    Profile,
}

impl Collection {
    /// Every collection, in table order.
    pub const ALL: [Collection; 3] = [Collection::Task, Collection::Content, Collection::Profile];

    /// Backing table name.
    pub fn table(self) -> &'static str {
        match self {
            Self::Task => "task_embeddings",
            Self::Content => "content_embeddings",
            Self::Profile => "profile_embeddings",
        }
    }

    /// Column only this collection carries, if any.
    pub(crate) fn extra_column(self) -> Option<&'static str> {
        match self {
            Self::Task => None,
            Self::Content => Some("content_type"),
            Self::Profile => Some("profile_version"),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A record to insert or replace.
#[derive(Clone, Debug)]
pub struct NewRecord<'a> {
    /// Target collection.
    pub collection: Collection,
    /// Unique key within the collection.
    pub key: &'a str,
    /// Owning user.
    pub owner_id: i64,
    /// Text the vector was computed from.
    pub source_text: &'a str,
    /// Embedding of `source_text`.
    pub vector: &'a [f32],
    /// Model that produced the vector.
    pub model_id: &'a str,
    /// Opaque metadata.
    pub metadata: &'a Metadata,
    /// Required for [`Collection::Content`].
    pub content_type: Option<&'a str>,
    /// Required for [`Collection::Profile`].
    pub profile_version: Option<i64>,
}

/// A stored record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingRecord {
    /// Collection the record lives in.
    pub collection: Collection,
    /// Unique key within the collection.
    pub key: String,
    /// Owning user.
    pub owner_id: i64,
    /// Text the vector was computed from.
    pub source_text: String,
    /// Stored vector.
    #[serde(skip)]
    pub vector: Vec<f32>,
    /// Model that produced the vector.
    pub model_id: String,
    /// Opaque metadata.
    pub metadata: Metadata,
    /// Content type, for content records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Profile version, for profile records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_version: Option<i64>,
    /// Set on first insert, never changed afterwards.
    pub created_at: DateTime<Utc>,
    /// Set on every write.
    pub updated_at: DateTime<Utc>,
}

/// Extra predicates on a similarity query.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryFilter {
    /// Content records of exactly this type.
    ContentType(String),
    /// Records whose metadata `field` equals `value`.
    Metadata {
        /// Top-level metadata key; letters, digits, and underscores only.
        field: String,
        /// Value to compare against.
        value: serde_json::Value,
    },
}

/// A nearest-neighbour query against one collection.
#[derive(Clone, Debug)]
pub struct SimilarityQuery<'a> {
    /// Collection to search.
    pub collection: Collection,
    /// Query vector.
    pub vector: &'a [f32],
    /// Restrict to one owner.
    pub owner_id: Option<i64>,
    /// Maximum number of results. Zero yields no results.
    pub limit: usize,
    /// Minimum similarity, in `[-1, 1]`.
    pub threshold: f32,
    /// Additional predicates, all of which must hold.
    pub filters: &'a [QueryFilter],
}

/// A record with its similarity to the query vector.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredRecord {
    /// Matched record.
    pub record: EmbeddingRecord,
    /// Cosine similarity to the query.
    pub similarity: f32,
}

/// Record counts per collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Task records.
    pub tasks: u64,
    /// Content records.
    pub content: u64,
    /// Profile records.
    pub profiles: u64,
}

impl StoreStats {
    /// Count for one collection.
    pub fn count(&self, collection: Collection) -> u64 {
        match collection {
            Collection::Task => self.tasks,
            Collection::Content => self.content,
            Collection::Profile => self.profiles,
        }
    }

    /// Records across every collection.
    pub fn total(&self) -> u64 {
        self.tasks + self.content + self.profiles
    }
}
