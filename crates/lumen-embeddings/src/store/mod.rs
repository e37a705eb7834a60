//! Persistent embedding store.
//!
//! - [`connection`]: bounded pool with pragmas and the distance function
//! - [`migrations`]: version-tracked schema
//! - [`repository`]: [`EmbeddingStore`] upsert, get, query, delete, stats
//! - [`types`]: records, queries, and results

pub mod connection;
pub mod migrations;
pub mod repository;
pub mod types;

pub use connection::{ConnectionConfig, ConnectionPool};
pub use repository::EmbeddingStore;
pub use types::{
    Collection, EmbeddingRecord, Metadata, NewRecord, QueryFilter, ScoredRecord, SimilarityQuery,
    StoreStats,
};

use lumen_settings::{LumenSettings, expand_home};
use tracing::info;

use crate::errors::Result;

/// Database path that selects a private in-memory store.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Build the pool described by `settings`, migrate it, and return a store.
pub fn open_store(settings: &LumenSettings) -> Result<EmbeddingStore> {
    let config = ConnectionConfig::from_settings(&settings.store);
    let path = settings.store.database_path.as_str();
    let pool = if path == IN_MEMORY_PATH {
        connection::new_in_memory(&config)?
    } else {
        let resolved = expand_home(path);
        connection::new_file(&resolved.to_string_lossy(), &config)?
    };

    let store = EmbeddingStore::new(pool, settings.embedding.dimensions);
    let applied = store.migrate()?;
    info!(
        path,
        pool_size = config.pool_size,
        dimensions = store.dimensions(),
        applied,
        "embedding store ready"
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{EmbeddingError, ValidationError};

    #[test]
    fn open_in_memory() {
        let mut settings = LumenSettings::default();
        settings.store.database_path = IN_MEMORY_PATH.into();
        settings.embedding.dimensions = 4;
        let store = open_store(&settings).unwrap();
        assert_eq!(store.dimensions(), 4);
        assert_eq!(store.stats().unwrap().total(), 0);
    }

    #[test]
    fn open_file_twice_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = LumenSettings::default();
        settings.store.database_path = dir.path().join("e.db").to_string_lossy().into_owned();
        settings.embedding.dimensions = 2;

        let store = open_store(&settings).unwrap();
        let metadata = Metadata::new();
        let _ = store
            .upsert(&NewRecord {
                collection: Collection::Task,
                key: "todo-1",
                owner_id: 1,
                source_text: "Buy milk pending",
                vector: &[1.0, 0.0],
                model_id: "m",
                metadata: &metadata,
                content_type: None,
                profile_version: None,
            })
            .unwrap();
        drop(store);

        let reopened = open_store(&settings).unwrap();
        assert!(reopened.get(Collection::Task, "todo-1").unwrap().is_some());
    }

    #[test]
    fn reopen_with_other_dimension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = LumenSettings::default();
        settings.store.database_path = dir.path().join("e.db").to_string_lossy().into_owned();
        settings.embedding.dimensions = 2;

        let store = open_store(&settings).unwrap();
        let metadata = Metadata::new();
        let _ = store
            .upsert(&NewRecord {
                collection: Collection::Content,
                key: "content_1",
                owner_id: 1,
                source_text: "Weekly plan",
                vector: &[1.0, 0.0],
                model_id: "m",
                metadata: &metadata,
                content_type: Some("note"),
                profile_version: None,
            })
            .unwrap();
        drop(store);

        settings.embedding.dimensions = 3;
        let err = open_store(&settings).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::Validation(ValidationError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(!err.is_retryable());

        settings.embedding.dimensions = 2;
        let reopened = open_store(&settings).unwrap();
        assert_eq!(reopened.stats().unwrap().content, 1);
    }

    #[test]
    fn empty_database_accepts_any_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = LumenSettings::default();
        settings.store.database_path = dir.path().join("e.db").to_string_lossy().into_owned();
        settings.embedding.dimensions = 2;
        drop(open_store(&settings).unwrap());

        settings.embedding.dimensions = 5;
        assert_eq!(open_store(&settings).unwrap().dimensions(), 5);
    }
}
