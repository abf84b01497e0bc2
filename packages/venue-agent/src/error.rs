//! Typed errors for the extraction agent.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell a
//! failed page fetch from a failed model call.

use std::fmt;

use thiserror::Error;

/// Errors produced while reducing an HTML document.
#[derive(Debug, Error)]
pub enum ReduceError {
    /// The parsed document has no `<body>` element
    #[error("malformed document: no body element")]
    MalformedDocument,
}

/// Errors that can occur while navigating to or reading a page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Navigation to a URL failed
    #[error("failed to navigate to {url}: {reason}")]
    Navigate { url: String, reason: String },

    /// Reading the current page's HTML failed
    #[error("failed to get page content: {0}")]
    Content(String),

    /// The fetched page could not be reduced
    #[error("failed to reduce page content: {0}")]
    Reduce(#[from] ReduceError),

    /// The browser session could not be created
    #[error("failed to open browser session: {0}")]
    Launch(String),

    /// Operation was cancelled
    #[error("navigation cancelled")]
    Cancelled,
}

/// Errors returned by a model backend's `execute`.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport failure (connection refused, timeout, TLS)
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response from the remote API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response did not have the expected shape
    #[error("parse error: {0}")]
    Parse(String),

    /// The response carried no choices or content
    #[error("no choices returned")]
    NoChoices,

    /// Operation was cancelled
    #[error("backend call cancelled")]
    Cancelled,
}

/// The error recorded against a single task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors from a result store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One failure collected by a worker.
#[derive(Debug, Error)]
pub enum WorkerFailure {
    /// A task ended with an error (its partial result was still stored)
    #[error("task {task}: {error}")]
    Task { task: String, error: TaskError },

    /// The worker's browser session could not be opened
    #[error("browser session: {0}")]
    Session(FetchError),

    /// Reading previously stored records failed
    #[error("reading existing records: {0}")]
    ReadExisting(StoreError),

    /// Persisting the worker's records failed
    #[error("flushing records: {0}")]
    Flush(StoreError),

    /// The worker task panicked or was aborted
    #[error("worker aborted: {0}")]
    Aborted(String),
}

/// All failures of one worker (one backend), joined.
#[derive(Debug)]
pub struct WorkerError {
    pub backend: String,
    pub failures: Vec<WorkerFailure>,
}

impl WorkerError {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            failures: Vec::new(),
        }
    }

    pub fn push(&mut self, failure: WorkerFailure) {
        self.failures.push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Ok(())` when nothing failed, otherwise `Err(self)`.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "[{}] {}", self.backend, failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for WorkerError {}

/// Failures of every worker in a run, joined.
#[derive(Debug)]
pub struct RunError {
    pub workers: Vec<WorkerError>,
}

impl RunError {
    /// Total number of joined failures across all workers.
    pub fn failure_count(&self) -> usize {
        self.workers.iter().map(|w| w.failures.len()).sum()
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, worker) in self.workers.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", worker)?;
        }
        Ok(())
    }
}

impl std::error::Error for RunError {}

/// Result type alias for page fetching.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_error_joins_failures() {
        let mut err = WorkerError::new("gpt-4o-mini");
        err.push(WorkerFailure::Task {
            task: "Room A".into(),
            error: FetchError::Content("boom".into()).into(),
        });
        err.push(WorkerFailure::Flush(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        ))));

        let text = err.to_string();
        assert!(text.contains("[gpt-4o-mini] task Room A: failed to get page content: boom"));
        assert!(text.contains("disk full"));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_empty_worker_error_is_ok() {
        assert!(WorkerError::new("claude").into_result().is_ok());
    }

    #[test]
    fn test_run_error_counts_all_failures() {
        let mut a = WorkerError::new("a");
        a.push(WorkerFailure::Aborted("panic".into()));
        let mut b = WorkerError::new("b");
        b.push(WorkerFailure::Session(FetchError::Launch("no chrome".into())));
        b.push(WorkerFailure::Aborted("panic".into()));

        let run = RunError { workers: vec![a, b] };
        assert_eq!(run.failure_count(), 3);
        assert_eq!(run.to_string().lines().count(), 3);
    }
}
