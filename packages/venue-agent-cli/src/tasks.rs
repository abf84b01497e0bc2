use std::path::Path;

use anyhow::{Context, Result};
use venue_agent::Task;

/// Read the task list, a JSON array of `{"name": ..., "url": ...}`.
pub async fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read tasks file {}", path.display()))?;

    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse tasks file {}", path.display()))
}
