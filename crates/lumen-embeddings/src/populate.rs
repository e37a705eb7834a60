//! Bulk population: index a batch of external items one at a time.
//!
//! Items are processed strictly in order with a fixed pause between them,
//! which keeps load on the embedding backend steady. A failing item is
//! recorded and skipped; the run always reaches the end of the batch.

use std::time::Duration;

use lumen_settings::PopulateSettings;
use tracing::{info, warn};

use crate::engine::SimilaritySearchEngine;
use crate::errors::{EmbeddingError, ProviderError, Result};
use crate::store::{EmbeddingRecord, Metadata};
use crate::text::profile_key;

/// One item to index.
#[derive(Clone, Debug, PartialEq)]
pub enum PopulateItem {
    /// A task, stored under its own id.
    Task {
        /// Task id, used as the record key.
        task_id: String,
        /// Owning user.
        owner_id: i64,
        /// Task title.
        text: String,
        /// Completion status.
        completed: bool,
        /// Opaque metadata.
        metadata: Metadata,
    },
    /// A piece of content, stored under a generated key.
    Content {
        /// Owning user.
        owner_id: i64,
        /// Content type label.
        content_type: String,
        /// Content body.
        text: String,
        /// Opaque metadata.
        metadata: Metadata,
    },
    /// A profile summary.
    Profile {
        /// Profile owner.
        user_id: i64,
        /// Profile version.
        profile_version: i64,
        /// Summary text.
        summary: String,
        /// Opaque metadata.
        metadata: Metadata,
    },
}

impl PopulateItem {
    /// Short human-readable identity for logs and reports.
    pub fn label(&self) -> String {
        match self {
            Self::Task { task_id, .. } => format!("task {task_id}"),
            Self::Content {
                owner_id,
                content_type,
                ..
            } => format!("{content_type} content of user {owner_id}"),
            Self::Profile {
                user_id,
                profile_version,
                ..
            } => format!("profile {}", profile_key(*user_id, *profile_version)),
        }
    }
}

/// A single item that could not be indexed.
#[derive(Debug)]
pub struct ItemFailure {
    /// Position in the input batch.
    pub index: usize,
    /// Item label.
    pub label: String,
    /// Why it failed.
    pub error: EmbeddingError,
}

/// Outcome of a population run.
#[derive(Debug, Default)]
pub struct PopulateReport {
    /// Keys of stored records, in input order.
    pub succeeded: Vec<String>,
    /// Items that failed, in input order.
    pub failed: Vec<ItemFailure>,
}

impl PopulateReport {
    /// Items attempted.
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Whether every item was stored.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sequential, throttled driver over [`SimilaritySearchEngine`].
#[derive(Debug)]
pub struct BulkPopulator<'a> {
    engine: &'a SimilaritySearchEngine,
    delay: Duration,
}

impl<'a> BulkPopulator<'a> {
    /// Populator that pauses `delay` between items.
    pub fn new(engine: &'a SimilaritySearchEngine, delay: Duration) -> Self {
        Self { engine, delay }
    }

    /// Populator configured from the populate settings section.
    pub fn from_settings(engine: &'a SimilaritySearchEngine, settings: &PopulateSettings) -> Self {
        Self::new(engine, Duration::from_millis(settings.delay_ms))
    }

    /// Pause between items.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Index every item in order.
    ///
    /// Fails up front only if the embedding backend is not ready. Per-item
    /// failures are logged and collected in the report.
    pub async fn run<I>(&self, items: I) -> Result<PopulateReport>
    where
        I: IntoIterator<Item = PopulateItem>,
    {
        if !self.engine.provider().is_ready() {
            let reason = "embedding backend is not ready".to_string();
            return Err(ProviderError::NotConfigured(reason).into());
        }

        let mut report = PopulateReport::default();
        for (index, item) in items.into_iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let label = item.label();
            match self.index_one(item).await {
                Ok(record) => report.succeeded.push(record.key),
                Err(error) => {
                    warn!(index, item = %label, error = %error, "populate item failed");
                    report.failed.push(ItemFailure {
                        index,
                        label,
                        error,
                    });
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "population finished"
        );
        Ok(report)
    }

    async fn index_one(&self, item: PopulateItem) -> Result<EmbeddingRecord> {
        match item {
            PopulateItem::Task {
                task_id,
                owner_id,
                text,
                completed,
                metadata,
            } => {
                self.engine
                    .index_task(&task_id, owner_id, &text, completed, metadata)
                    .await
            }
            PopulateItem::Content {
                owner_id,
                content_type,
                text,
                metadata,
            } => {
                self.engine
                    .index_content(owner_id, &content_type, &text, metadata)
                    .await
            }
            PopulateItem::Profile {
                user_id,
                profile_version,
                summary,
                metadata,
            } => {
                self.engine
                    .index_profile(user_id, profile_version, &summary, metadata)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use assert_matches::assert_matches;

    use super::*;
    use crate::engine::EngineConfig;
    use crate::errors::ValidationError;
    use crate::provider::EmbeddingProvider;
    use crate::service::testing::FixtureService;
    use crate::service::{EmbeddingService, MockEmbeddingService};
    use crate::store::connection::{ConnectionConfig, new_in_memory};
    use crate::store::{Collection, EmbeddingStore};

    fn engine_over(service: Arc<dyn EmbeddingService>) -> SimilaritySearchEngine {
        let dims = service.dimensions();
        let provider = EmbeddingProvider::with_limits(service, 8_000, Duration::from_secs(5));
        let store = EmbeddingStore::new(new_in_memory(&ConnectionConfig::default()).unwrap(), dims);
        let _ = store.migrate().unwrap();
        SimilaritySearchEngine::new(provider, store, &EngineConfig::default()).unwrap()
    }

    fn task(id: &str, owner_id: i64, text: &str) -> PopulateItem {
        PopulateItem::Task {
            task_id: id.into(),
            owner_id,
            text: text.into(),
            completed: false,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn labels() {
        assert_eq!(task("todo-1", 1, "x").label(), "task todo-1");
        let profile = PopulateItem::Profile {
            user_id: 4,
            profile_version: 2,
            summary: "s".into(),
            metadata: Metadata::new(),
        };
        assert_eq!(profile.label(), "profile 4:2");
        let content = PopulateItem::Content {
            owner_id: 9,
            content_type: "note".into(),
            text: "t".into(),
            metadata: Metadata::new(),
        };
        assert_eq!(content.label(), "note content of user 9");
    }

    #[tokio::test]
    async fn indexes_every_kind() {
        let engine = engine_over(Arc::new(MockEmbeddingService::new(8)));
        let populator = BulkPopulator::new(&engine, Duration::ZERO);
        let items = vec![
            task("todo-1", 1, "Buy milk"),
            PopulateItem::Content {
                owner_id: 1,
                content_type: "note".into(),
                text: "Weekly plan".into(),
                metadata: Metadata::new(),
            },
            PopulateItem::Profile {
                user_id: 1,
                profile_version: 1,
                summary: "Likes lists".into(),
                metadata: Metadata::new(),
            },
        ];

        let report = populator.run(items).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.attempted(), 3);
        assert_eq!(report.succeeded[0], "todo-1");
        assert!(report.succeeded[1].starts_with("content_"));
        assert_eq!(report.succeeded[2], "1:1");

        let stats = engine.stats().await.unwrap();
        assert_eq!((stats.tasks, stats.content, stats.profiles), (1, 1, 1));
    }

    #[tokio::test]
    async fn continues_past_failures() {
        let engine = engine_over(Arc::new(FixtureService::new(3).failing_on("broken")));
        let populator = BulkPopulator::new(&engine, Duration::ZERO);
        let items = vec![
            task("a", 1, "first"),
            task("b", 1, "broken one"),
            task("c", 1, "   "),
            task("d", 1, "last"),
        ];

        let report = populator.run(items).await.unwrap();
        assert_eq!(report.succeeded, vec!["a", "d"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].index, 1);
        assert_eq!(report.failed[0].label, "task b");
        assert_matches!(report.failed[0].error, EmbeddingError::Provider(_));
        assert_eq!(report.failed[1].index, 2);
        assert_matches!(
            report.failed[1].error,
            EmbeddingError::Validation(ValidationError::EmptyText)
        );
        assert!(engine.get(Collection::Task, "b").await.unwrap().is_none());
        assert_eq!(engine.stats().await.unwrap().tasks, 2);
    }

    #[tokio::test]
    async fn processes_in_order() {
        let service = Arc::new(FixtureService::new(3));
        let engine = engine_over(service.clone());
        let populator = BulkPopulator::new(&engine, Duration::ZERO);
        let items = vec![
            task("1", 1, "one"),
            task("2", 1, "two"),
            task("3", 1, "three"),
        ];
        let _ = populator.run(items).await.unwrap();
        assert_eq!(
            service.seen(),
            vec!["one pending", "two pending", "three pending"]
        );
    }

    #[tokio::test]
    async fn pauses_between_items_only() {
        let engine = engine_over(Arc::new(MockEmbeddingService::new(4)));
        let delay = Duration::from_millis(30);
        let populator = BulkPopulator::new(&engine, delay);

        let items = vec![
            task("1", 1, "one"),
            task("2", 1, "two"),
            task("3", 1, "three"),
        ];
        let started = Instant::now();
        let report = populator.run(items).await.unwrap();
        assert_eq!(report.succeeded.len(), 3);
        assert!(started.elapsed() >= delay * 2);

        let started = Instant::now();
        let _ = populator.run(vec![task("4", 1, "four")]).await.unwrap();
        assert!(started.elapsed() < delay * 10);
    }

    #[tokio::test]
    async fn empty_batch() {
        let engine = engine_over(Arc::new(MockEmbeddingService::new(4)));
        let report = BulkPopulator::new(&engine, Duration::from_secs(60))
            .run(Vec::new())
            .await
            .unwrap();
        assert_eq!(report.attempted(), 0);
    }

    #[tokio::test]
    async fn refuses_when_backend_not_ready() {
        let service = Arc::new(MockEmbeddingService::new(4));
        service.set_ready(false);
        let engine = engine_over(service);
        let err = BulkPopulator::new(&engine, Duration::ZERO)
            .run(vec![task("1", 1, "one")])
            .await
            .unwrap_err();
        assert_matches!(
            err,
            EmbeddingError::Provider(ProviderError::NotConfigured(_))
        );
        assert_eq!(engine.stats().await.unwrap().total(), 0);
    }

    #[test]
    fn delay_from_settings() {
        let engine = engine_over(Arc::new(MockEmbeddingService::new(4)));
        let settings = PopulateSettings {
            delay_ms: 250,
            ..PopulateSettings::default()
        };
        let populator = BulkPopulator::from_settings(&engine, &settings);
        assert_eq!(populator.delay(), Duration::from_millis(250));
    }
}
