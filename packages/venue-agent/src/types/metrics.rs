//! Per-task telemetry.

use std::time::Duration;

/// Accumulated while one task runs; handed to the store exactly once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMetrics {
    /// Wall time from task start to flush
    pub elapsed: Duration,

    /// Sum of backend execution durations, fallback calls included
    pub backend_time: Duration,

    /// Sum of raw page lengths fetched
    pub raw_length: usize,

    /// Sum of reduced page lengths fetched
    pub reduced_length: usize,

    /// Number of pages fetched successfully
    pub pages_visited: usize,

    /// Token usage from the most recent backend call
    pub token_count: u64,

    /// Main-loop backend executions performed
    pub turns: usize,

    /// The fallback extractor ran because nothing was extracted
    pub token_limit_reached: bool,
}

impl SessionMetrics {
    /// Add one fetched page's lengths.
    pub fn record_page(&mut self, raw_length: usize, reduced_length: usize) {
        self.raw_length += raw_length;
        self.reduced_length += reduced_length;
        self.pages_visited += 1;
    }
}
