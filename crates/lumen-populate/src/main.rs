//! # lumen-populate
//!
//! Fills the embedding store from an upstream task feed: loads settings,
//! opens and migrates the store, indexes every task one at a time, and
//! prints the final tally.

#![deny(unsafe_code)]

mod feed;
mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lumen_embeddings::store::IN_MEMORY_PATH;
use lumen_embeddings::{
    BulkPopulator, EmbeddingConfig, EmbeddingProvider, EmbeddingService, EngineConfig,
    HttpEmbeddingService, MockEmbeddingService, PopulateReport, SimilaritySearchEngine, open_store,
};
use lumen_settings::{LumenSettings, expand_home, load_settings_from_path, settings_path};
use tracing::info;

/// Bulk-index an upstream task feed.
#[derive(Parser, Debug)]
#[command(
    name = "lumen-populate",
    about = "Index an upstream task feed into the embedding store"
)]
struct Cli {
    /// Settings file (defaults to `~/.lumen/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Feed URL or JSON file (overrides `populate.sourceUrl`).
    #[arg(long)]
    source: Option<String>,

    /// Path to the `SQLite` database (overrides `store.databasePath`).
    #[arg(long)]
    db_path: Option<String>,

    /// Pause between items in milliseconds (overrides `populate.delayMs`).
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Index at most this many tasks.
    #[arg(long)]
    max_items: Option<usize>,

    /// Use the offline deterministic embedder instead of the HTTP backend.
    #[arg(long)]
    mock: bool,
}

impl Cli {
    fn apply(&self, settings: &mut LumenSettings) {
        if let Some(path) = &self.db_path {
            settings.store.database_path.clone_from(path);
        }
        if let Some(source) = &self.source {
            settings.populate.source_url.clone_from(source);
        }
        if let Some(delay_ms) = self.delay_ms {
            settings.populate.delay_ms = delay_ms;
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn build_engine(settings: &LumenSettings, mock: bool) -> Result<SimilaritySearchEngine> {
    if settings.store.database_path != IN_MEMORY_PATH {
        ensure_parent_dir(&expand_home(&settings.store.database_path))?;
    }
    let store = open_store(settings).context("Failed to open embedding store")?;

    let config = EmbeddingConfig::from_settings(&settings.embedding);
    let service: Arc<dyn EmbeddingService> = if mock {
        Arc::new(MockEmbeddingService::new(config.dimensions))
    } else {
        let http = HttpEmbeddingService::from_config(&config)
            .context("Failed to configure embedding backend")?;
        Arc::new(http)
    };
    let provider = EmbeddingProvider::new(service, &config);

    let engine_config = EngineConfig::from_settings(&settings.store);
    SimilaritySearchEngine::new(provider, store, &engine_config)
        .context("Embedding backend and store disagree")
}

async fn run(
    settings: &LumenSettings,
    mock: bool,
    max_items: Option<usize>,
) -> Result<PopulateReport> {
    let engine = build_engine(settings, mock)?;

    let source = settings.populate.source_url.as_str();
    let client = reqwest::Client::new();
    let tasks = feed::load(&client, source).await?;
    let total = tasks.len();
    let items: Vec<_> = tasks
        .into_iter()
        .take(max_items.unwrap_or(usize::MAX))
        .map(feed::UpstreamTask::into_item)
        .collect();
    let selected = items.len();
    info!(source, total, selected, mock, "starting population");

    let populator = BulkPopulator::from_settings(&engine, &settings.populate);
    Ok(populator.run(items).await?)
}

fn print_report(report: &PopulateReport) {
    for failure in &report.failed {
        println!(
            "  failed #{} {}: {}",
            failure.index, failure.label, failure.error
        );
    }
    println!(
        "Populated {} of {} items ({} failed)",
        report.succeeded.len(),
        report.attempted(),
        report.failed.len()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_file = args.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&settings_file)
        .with_context(|| format!("Failed to load settings from {}", settings_file.display()))?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    logging::init_subscriber(&settings.logging.level);

    let report = run(&settings, args.mock, args.max_items).await?;
    print_report(&report);
    Ok(())
}
