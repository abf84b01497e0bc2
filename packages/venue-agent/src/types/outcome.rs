//! What a finished task hands to the result store.

use serde::{Deserialize, Serialize};

use super::{metrics::SessionMetrics, record::Record, task::Task};
use crate::error::TaskError;

/// How the agent loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The loop finished by itself (done, fetch error, nothing pending, or a
    /// backend failure after records were already collected).
    Normal,

    /// Nothing was extracted before the backend failed or the turn limit hit,
    /// so the fallback extractor was run over the fetched pages.
    ViaFallback,
}

/// Result of running the agent driver over one task.
#[derive(Debug)]
pub struct TaskOutcome {
    pub task: Task,
    pub records: Vec<Record>,
    pub metrics: SessionMetrics,
    pub error: Option<TaskError>,
    pub completion: Completion,
}

impl TaskOutcome {
    /// Flatten into store rows: one per record, or a single row without
    /// record fields when nothing was extracted.
    pub fn rows(&self, task_index: usize, backend: &str) -> Vec<PersistedRecord> {
        let base = PersistedRecord {
            task_index,
            backend: backend.to_string(),
            backend_ms: self.metrics.backend_time.as_millis() as u64,
            request_ms: self.metrics.elapsed.as_millis() as u64,
            pages_visited: self.metrics.pages_visited,
            raw_length: self.metrics.raw_length,
            reduced_length: self.metrics.reduced_length,
            token_count: self.metrics.token_count,
            provider_url: self.task.seed_url.clone(),
            provider_name: self.task.name.clone(),
            token_limit_reached: self.metrics.token_limit_reached,
            error: self
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default(),
            ..Default::default()
        };

        if self.records.is_empty() {
            return vec![base];
        }

        self.records
            .iter()
            .map(|record| base.clone().with_record(record))
            .collect()
    }
}

/// `(task index, backend, record name, detail URL)`
pub type MergeKey = (usize, String, String, String);

/// One persisted result row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    #[serde(rename = "ID")]
    pub task_index: usize,
    #[serde(rename = "LLM")]
    pub backend: String,
    #[serde(rename = "LLM Duration (ms)")]
    pub backend_ms: u64,
    #[serde(rename = "Request Duration (ms)")]
    pub request_ms: u64,
    #[serde(rename = "Websites Checked")]
    pub pages_visited: usize,
    #[serde(rename = "Website Max Length")]
    pub raw_length: usize,
    #[serde(rename = "Website Reduced Length")]
    pub reduced_length: usize,
    #[serde(rename = "Token Count")]
    pub token_count: u64,
    #[serde(rename = "Provider URL")]
    pub provider_url: String,
    #[serde(rename = "Provider Name")]
    pub provider_name: String,
    #[serde(rename = "Room Name")]
    pub record_name: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Min Players")]
    pub players_min: i64,
    #[serde(rename = "Max Players")]
    pub players_max: i64,
    #[serde(rename = "Duration")]
    pub duration: i64,
    #[serde(rename = "Booking URL")]
    pub booking_url: String,
    #[serde(rename = "Detail Page URL")]
    pub detail_page_url: String,
    #[serde(rename = "Image URL")]
    pub image_url: String,
    #[serde(rename = "Genre")]
    pub genre: String,
    #[serde(rename = "Difficulty")]
    pub difficulty: String,
    #[serde(rename = "Token Limit Reached")]
    pub token_limit_reached: bool,
    #[serde(rename = "Error")]
    pub error: String,
}

impl PersistedRecord {
    /// Copy a record's descriptive fields into this row.
    pub fn with_record(mut self, record: &Record) -> Self {
        self.record_name = record.name.clone();
        self.description = record.description.clone();
        self.players_min = record.players_min;
        self.players_max = record.players_max;
        self.duration = record.duration;
        self.booking_url = record.booking_url.clone();
        self.detail_page_url = record.detail_page_url.clone();
        self.image_url = record.image_url.clone();
        self.genre = record.genre.clone();
        self.difficulty = record.difficulty.clone();
        self
    }

    /// Key used to merge rows.
    pub fn merge_key(&self) -> MergeKey {
        (
            self.task_index,
            self.backend.clone(),
            self.record_name.clone(),
            self.detail_page_url.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use std::time::Duration;

    fn outcome(records: Vec<Record>, error: Option<TaskError>) -> TaskOutcome {
        TaskOutcome {
            task: Task::new("Exit Games", "https://exit.example"),
            records,
            metrics: SessionMetrics {
                backend_time: Duration::from_millis(1500),
                token_count: 42,
                pages_visited: 3,
                ..Default::default()
            },
            error,
            completion: Completion::Normal,
        }
    }

    #[test]
    fn test_rows_one_per_record() {
        let out = outcome(
            vec![Record::named("Tomb"), Record::named("Heist")],
            None,
        );
        let rows = out.rows(4, "gpt-4o-mini");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record_name, "Tomb");
        assert_eq!(rows[1].record_name, "Heist");
        assert!(rows.iter().all(|r| r.task_index == 4
            && r.backend == "gpt-4o-mini"
            && r.provider_name == "Exit Games"
            && r.backend_ms == 1500
            && r.token_count == 42
            && r.pages_visited == 3));
    }

    #[test]
    fn test_rows_without_records_carry_error() {
        let out = outcome(
            vec![],
            Some(FetchError::Content("timeout".into()).into()),
        );
        let rows = out.rows(0, "claude");

        assert_eq!(rows.len(), 1);
        assert!(rows[0].record_name.is_empty());
        assert_eq!(rows[0].error, "failed to get page content: timeout");
    }
}
