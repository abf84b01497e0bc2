//! Fan-out over backends.
//!
//! One worker per backend, all running concurrently. A worker owns its
//! backend, one browser session and one result store, walks the whole task
//! list in order and flushes once at the end. Failures are collected rather
//! than aborting the run; a worker that cannot start simply reports why.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::driver::AgentDriver;
use crate::error::{RunError, WorkerError, WorkerFailure};
use crate::traits::{Backend, BrowserLauncher, StoreFactory};
use crate::types::{DriverConfig, Task};

/// Runs every task against every backend.
pub struct TaskRunner {
    launcher: Arc<dyn BrowserLauncher>,
    stores: Arc<dyn StoreFactory>,
    config: DriverConfig,
    cancel: CancellationToken,
}

impl TaskRunner {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, stores: Arc<dyn StoreFactory>) -> Self {
        Self {
            launcher,
            stores,
            config: DriverConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a cancellation token, e.g. one cancelled on Ctrl-C.
    ///
    /// Cancelling stops in-flight navigations and backend calls; workers
    /// then skip their remaining tasks and still flush.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run all `tasks` on all `backends` and wait for every worker.
    ///
    /// Returns `Ok(())` only if no worker recorded any failure.
    pub async fn run(&self, backends: Vec<Box<dyn Backend>>, tasks: Vec<Task>) -> Result<(), RunError> {
        let tasks: Arc<[Task]> = tasks.into();
        info!(backends = backends.len(), tasks = tasks.len(), "starting run");

        let mut names = Vec::with_capacity(backends.len());
        let mut handles = Vec::with_capacity(backends.len());
        for backend in backends {
            names.push(backend.name().to_string());
            let worker = Worker {
                backend,
                launcher: Arc::clone(&self.launcher),
                stores: Arc::clone(&self.stores),
                tasks: Arc::clone(&tasks),
                config: self.config.clone(),
                cancel: self.cancel.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }

        let mut workers = Vec::new();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(worker_error)) => workers.push(worker_error),
                Err(join_error) => {
                    error!(backend = %name, error = %join_error, "worker aborted");
                    let mut worker_error = WorkerError::new(name);
                    worker_error.push(WorkerFailure::Aborted(join_error.to_string()));
                    workers.push(worker_error);
                }
            }
        }

        if workers.is_empty() {
            info!("run finished");
            Ok(())
        } else {
            let run_error = RunError { workers };
            warn!(failures = run_error.failure_count(), "run finished with failures");
            Err(run_error)
        }
    }
}

/// Everything one spawned worker owns.
struct Worker {
    backend: Box<dyn Backend>,
    launcher: Arc<dyn BrowserLauncher>,
    stores: Arc<dyn StoreFactory>,
    tasks: Arc<[Task]>,
    config: DriverConfig,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) -> Result<(), WorkerError> {
        let name = self.backend.name().to_string();
        let mut failures = WorkerError::new(&name);

        let mut browser = match self.launcher.open_session().await {
            Ok(browser) => browser,
            Err(e) => {
                error!(backend = %name, error = %e, "failed to open browser session");
                failures.push(WorkerFailure::Session(e));
                return failures.into_result();
            }
        };

        let mut store = self.stores.open(&name);
        let existing = match store.read_existing(&name).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(backend = %name, error = %e, "failed to read existing records");
                failures.push(WorkerFailure::ReadExisting(e));
                return failures.into_result();
            }
        };

        let driver = AgentDriver::new(&self.config, &self.cancel);
        for (index, task) in self.tasks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(backend = %name, remaining = self.tasks.len() - index, "cancelled, skipping remaining tasks");
                break;
            }

            if existing.iter().any(|row| row.record_name == task.name) {
                info!(backend = %name, task = %task.name, "already processed, skipping");
                continue;
            }

            let outcome = driver.run(self.backend.as_mut(), browser.as_mut(), task).await;
            for row in outcome.rows(index, &name) {
                store.add_record(row);
            }
            if let Some(error) = outcome.error {
                failures.push(WorkerFailure::Task {
                    task: task.name.clone(),
                    error,
                });
            }
        }

        if let Err(e) = store.flush(&name).await {
            error!(backend = %name, error = %e, "failed to flush records");
            failures.push(WorkerFailure::Flush(e));
        }

        failures.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStoreFactory;
    use crate::testing::{MockLauncher, ScriptedBackend};
    use crate::types::{CallRef, ModelAction, PersistedRecord, Record};

    const SEED: &str = "https://rooms.example/";

    fn extract(names: &[&str]) -> Vec<ModelAction> {
        vec![ModelAction::extraction(
            CallRef::new("c", "list_escape_rooms"),
            names.iter().map(|n| Record::named(*n)).collect(),
        )]
    }

    #[tokio::test]
    async fn test_worker_stores_rows_and_flushes() {
        let launcher = Arc::new(MockLauncher::new().with_page(SEED, "<body><p>rooms</p></body>"));
        let stores = Arc::new(MemoryStoreFactory::new());
        let backend = ScriptedBackend::new("gpt").then_respond(extract(&["Tomb", "Heist"]));

        let result = TaskRunner::new(launcher, stores.clone())
            .run(vec![Box::new(backend)], vec![Task::new("Rooms", SEED)])
            .await;
        tokio_test::assert_ok!(result);

        let rows = stores.flushed("gpt");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record_name, "Tomb");
        assert_eq!(rows[1].record_name, "Heist");
        assert!(rows.iter().all(|r| r.provider_name == "Rooms" && r.task_index == 0));
    }

    #[tokio::test]
    async fn test_session_failure_is_reported() {
        let launcher = Arc::new(MockLauncher::new().fail_launch());
        let stores = Arc::new(MemoryStoreFactory::new());
        let backend = ScriptedBackend::new("gpt");

        let err = TaskRunner::new(launcher, stores.clone())
            .run(vec![Box::new(backend)], vec![Task::new("Rooms", SEED)])
            .await
            .unwrap_err();

        assert_eq!(err.failure_count(), 1);
        assert!(matches!(err.workers[0].failures[0], WorkerFailure::Session(_)));
        assert!(!stores.was_flushed("gpt"));
    }

    #[tokio::test]
    async fn test_already_processed_task_is_skipped() {
        let launcher = Arc::new(MockLauncher::new().with_page(SEED, "<body>x</body>"));
        let existing = PersistedRecord {
            backend: "gpt".into(),
            record_name: "Rooms".into(),
            ..Default::default()
        };
        let stores = Arc::new(MemoryStoreFactory::new().with_existing("gpt", vec![existing]));
        let backend = ScriptedBackend::new("gpt");
        let log = backend.log();

        TaskRunner::new(launcher.clone(), stores.clone())
            .run(vec![Box::new(backend)], vec![Task::new("Rooms", SEED)])
            .await
            .unwrap();

        assert!(launcher.navigations().is_empty());
        assert_eq!(log.executions(), 0);
        assert_eq!(stores.flushed("gpt").len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_still_flushes() {
        let launcher = Arc::new(MockLauncher::new().with_page(SEED, "<body>x</body>"));
        let stores = Arc::new(MemoryStoreFactory::new());
        let backend = ScriptedBackend::new("gpt");
        let cancel = CancellationToken::new();
        cancel.cancel();

        TaskRunner::new(launcher.clone(), stores.clone())
            .with_cancellation(cancel)
            .run(vec![Box::new(backend)], vec![Task::new("Rooms", SEED)])
            .await
            .unwrap();

        assert!(launcher.navigations().is_empty());
        assert!(stores.was_flushed("gpt"));
    }
}
