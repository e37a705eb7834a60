//! Upstream task feed.
//!
//! The feed is a JSON array of `{ "id", "userId", "title", "completed" }`
//! objects, read from an HTTP(S) URL or a local file.

use std::path::Path;

use anyhow::{Context, Result};
use lumen_embeddings::{Metadata, PopulateItem};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// One task as published by the upstream feed.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamTask {
    /// Upstream id.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Task title.
    pub title: String,
    /// Completion status.
    #[serde(default)]
    pub completed: bool,
}

impl UpstreamTask {
    /// Record key for this task.
    pub fn key(&self) -> String {
        format!("todo-{}", self.id)
    }

    /// Turn into an indexable item.
    pub fn into_item(self) -> PopulateItem {
        let mut metadata = Metadata::new();
        let _ = metadata.insert("source".into(), Value::from("upstream"));
        let _ = metadata.insert("upstreamId".into(), Value::from(self.id));
        PopulateItem::Task {
            task_id: self.key(),
            owner_id: self.user_id,
            text: self.title,
            completed: self.completed,
            metadata,
        }
    }
}

/// Whether `source` names a remote feed rather than a file.
pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Load tasks from a URL or a file path.
pub async fn load(client: &reqwest::Client, source: &str) -> Result<Vec<UpstreamTask>> {
    if is_remote(source) {
        fetch(client, source).await
    } else {
        read_file(Path::new(source))
    }
}

/// Fetch tasks over HTTP.
pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<UpstreamTask>> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to reach task feed at {url}"))?
        .error_for_status()
        .with_context(|| format!("Task feed at {url} returned an error"))?;
    let tasks: Vec<UpstreamTask> = response
        .json()
        .await
        .with_context(|| format!("Task feed at {url} is not a task array"))?;
    debug!(url, count = tasks.len(), "fetched task feed");
    Ok(tasks)
}

/// Read tasks from a JSON file.
pub fn read_file(path: &Path) -> Result<Vec<UpstreamTask>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read task feed {}", path.display()))?;
    let tasks: Vec<UpstreamTask> = serde_json::from_str(&content)
        .with_context(|| format!("Task feed {} is not a task array", path.display()))?;
    debug!(path = %path.display(), count = tasks.len(), "read task feed");
    Ok(tasks)
}
