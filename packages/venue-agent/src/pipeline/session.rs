//! Per-task extraction state.

use std::time::Duration;

use super::prompts::page_block;
use crate::error::TaskError;
use crate::reducer::ContentFetchResult;
use crate::types::{Completion, Record, SessionMetrics, Task, TaskOutcome};

/// Everything the driver accumulates while working on one task.
///
/// Records only ever grow. The prompt buffer starts with the task
/// instruction and collects every fetched page block; it is never cleared
/// within a task.
#[derive(Debug)]
pub struct ExtractionSession {
    task: Task,
    records: Vec<Record>,
    metrics: SessionMetrics,
    error: Option<TaskError>,
    prompt: String,
    pages: Vec<String>,
}

impl ExtractionSession {
    pub fn new(task: Task, task_prompt: &str) -> Self {
        Self {
            task,
            records: Vec::new(),
            metrics: SessionMetrics::default(),
            error: None,
            prompt: task_prompt.to_string(),
            pages: Vec::new(),
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn add_records(&mut self, records: &[Record]) {
        self.records.extend_from_slice(records);
    }

    pub fn metrics_mut(&mut self) -> &mut SessionMetrics {
        &mut self.metrics
    }

    /// Add a fetched page to the metrics, the prompt buffer and the page list.
    pub fn record_page(&mut self, url: &str, page: &ContentFetchResult) {
        self.metrics.record_page(page.raw_length, page.reduced_length);
        let block = page_block(url, &page.reduced_content);
        self.prompt.push_str(&block);
        self.pages.push(block);
    }

    /// The accumulated prompt buffer.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Page blocks in fetch order.
    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn has_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Record an error. The first one is kept.
    pub fn fail(&mut self, error: impl Into<TaskError>) {
        if self.error.is_none() {
            self.error = Some(error.into());
        }
    }

    /// Close the session.
    pub fn finish(mut self, elapsed: Duration, completion: Completion) -> TaskOutcome {
        self.metrics.elapsed = elapsed;
        TaskOutcome {
            task: self.task,
            records: self.records,
            metrics: self.metrics,
            error: self.error,
            completion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, FetchError};

    fn page(content: &str, raw_length: usize) -> ContentFetchResult {
        ContentFetchResult {
            reduced_content: content.to_string(),
            raw_length,
            reduced_length: content.len(),
        }
    }

    #[test]
    fn test_pages_accumulate_into_prompt() {
        let mut session = ExtractionSession::new(Task::new("A", "https://a.example"), "List rooms.");
        session.record_page("https://a.example", &page("<p>1</p>", 100));
        session.record_page("https://a.example/2", &page("<p>2</p>", 50));

        assert_eq!(session.pages().len(), 2);
        assert_eq!(
            session.prompt(),
            "List rooms.Current URL: https://a.example; Current website content: <p>1</p>\
             Current URL: https://a.example/2; Current website content: <p>2</p>"
        );

        let outcome = session.finish(Duration::from_secs(2), Completion::Normal);
        assert_eq!(outcome.metrics.pages_visited, 2);
        assert_eq!(outcome.metrics.raw_length, 150);
        assert_eq!(outcome.metrics.reduced_length, 16);
        assert_eq!(outcome.metrics.elapsed, Duration::from_secs(2));
    }

    #[test]
    fn test_first_error_wins() {
        let mut session = ExtractionSession::new(Task::new("A", "https://a.example"), "");
        session.fail(FetchError::Cancelled);
        session.fail(BackendError::NoChoices);

        let outcome = session.finish(Duration::ZERO, Completion::Normal);
        assert!(matches!(outcome.error, Some(TaskError::Fetch(FetchError::Cancelled))));
    }
}
