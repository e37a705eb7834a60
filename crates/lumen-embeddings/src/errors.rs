//! Error types for embedding, storage, and search.
//!
//! Every variant carries enough context (collection, key, position, cause)
//! for a caller to decide whether to retry. [`EmbeddingError::is_retryable`]
//! encodes that decision once.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::store::Collection;

/// Caller input that can never succeed as given.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Text to embed was empty after trimming.
    #[error("text must not be empty")]
    EmptyText,

    /// Record key was empty.
    #[error("key must not be empty")]
    EmptyKey,

    /// Vector length does not match the configured dimension.
    #[error("vector has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        /// Configured dimension D.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// A vector component was NaN or infinite.
    #[error("vector component {index} is not finite")]
    NonFiniteComponent {
        /// Position of the first bad component.
        index: usize,
    },

    /// Similarity threshold outside `[-1, 1]`.
    #[error("similarity threshold {0} is outside [-1, 1]")]
    InvalidThreshold(f64),

    /// Metadata filter field is not a plain identifier.
    #[error("invalid metadata filter field: {0:?}")]
    InvalidFilterField(String),

    /// Filter does not apply to the target collection.
    #[error("{filter} filter is not supported on {collection}")]
    UnsupportedFilter {
        /// Collection that was queried.
        collection: Collection,
        /// Filter kind that was rejected.
        filter: &'static str,
    },

    /// A collection-specific field was not supplied.
    #[error("{collection} records require {field}")]
    MissingField {
        /// Collection being written.
        collection: Collection,
        /// Field that is required there.
        field: &'static str,
    },

    /// A vector blob or literal could not be decoded.
    #[error("malformed vector: {0}")]
    MalformedVector(String),
}

/// Failures from an embedding backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport failure talking to the provider.
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status.
    #[error("embedding API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Provider asked us to slow down.
    #[error("embedding API rate limited")]
    RateLimited {
        /// Seconds from the `retry-after` header, when present.
        retry_after_secs: Option<u64>,
    },

    /// Provider did not answer within the configured deadline.
    #[error("embedding request timed out after {after_ms}ms")]
    Timeout {
        /// Deadline that elapsed.
        after_ms: u64,
    },

    /// Provider answered but the payload was unusable.
    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    /// Provider is missing configuration such as an API key.
    #[error("embedding provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::RateLimited { .. } | Self::Timeout { .. } => true,
            Self::MalformedResponse(_) | Self::NotConfigured(_) => false,
        }
    }
}

/// Failures from the backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A statement against one collection failed.
    #[error("{op} on {collection}{} failed: {source}", key_suffix(.key.as_deref()))]
    Sqlite {
        /// Operation that was running.
        op: &'static str,
        /// Collection it targeted.
        collection: Collection,
        /// Record key, when the operation addressed one.
        key: Option<String>,
        /// Underlying driver error.
        #[source]
        source: rusqlite::Error,
    },

    /// A statement not tied to a collection failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection became free in time, or the pool could not be built.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A store operation exceeded its deadline.
    #[error("store operation {op} timed out after {after_ms}ms")]
    Timeout {
        /// Operation that was running.
        op: &'static str,
        /// Deadline that elapsed.
        after_ms: u64,
    },

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// What went wrong.
        message: String,
    },

    /// Metadata could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A stored row could not be decoded.
    #[error("corrupt record {key} in {collection}: {message}")]
    Corrupt {
        /// Collection holding the row.
        collection: Collection,
        /// Key of the row.
        key: String,
        /// What was wrong with it.
        message: String,
    },

    /// The blocking worker running a store call panicked or was cancelled.
    #[error("store worker failed: {0}")]
    Join(String),
}

fn key_suffix(key: Option<&str>) -> String {
    key.map(|k| format!(" (key {k})")).unwrap_or_default()
}

impl StoreError {
    /// Build a mapper that tags a driver error with its operation context.
    pub(crate) fn sqlite(
        op: &'static str,
        collection: Collection,
        key: Option<&str>,
    ) -> impl FnOnce(rusqlite::Error) -> Self {
        let key = key.map(ToString::to_string);
        move |source| Self::Sqlite {
            op,
            collection,
            key,
            source,
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Sqlite { source, .. } | Self::Database(source) => is_lock_contention(source),
            Self::Pool(_) | Self::Timeout { .. } => true,
            Self::Migration { .. } | Self::Serde(_) | Self::Corrupt { .. } | Self::Join(_) => false,
        }
    }
}

fn is_lock_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Umbrella error for every public operation of this crate.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Invalid input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Embedding backend failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// One item of a multi-text embedding failed.
    #[error("embedding item {index} failed: {source}")]
    BatchItem {
        /// Position of the failing input.
        index: usize,
        /// Why it failed.
        #[source]
        source: Box<EmbeddingError>,
    },
}

impl EmbeddingError {
    /// Whether a retry could plausibly succeed. Validation errors never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Provider(e) => e.is_retryable(),
            Self::Store(e) => e.is_retryable(),
            Self::BatchItem { source, .. } => source.is_retryable(),
        }
    }
}

/// Result alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
