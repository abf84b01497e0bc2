//! The per-task agent loop.
//!
//! Starting from the seed page, the driver alternates between fetching the
//! pages a backend asked for and asking the backend what to do next, until
//! the backend stops requesting content, something fails or the turn limit
//! is reached. A task that ends without records gets one more chance via
//! the [`FallbackExtractor`].

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::fallback::FallbackExtractor;
use super::prompts::ACKNOWLEDGEMENT;
use super::session::ExtractionSession;
use crate::error::{BackendError, FetchError, FetchResult};
use crate::reducer::{reduce, ContentFetchResult};
use crate::traits::{Backend, BrowserSession};
use crate::types::{Completion, DriverConfig, ModelAction, Task, TaskOutcome, Turn};

/// How the main loop stopped.
enum LoopEnd {
    /// Nothing left to do, or a fetch failed.
    Finished,
    /// The backend failed or the turn limit was hit.
    Exhausted(Option<BackendError>),
}

/// Drives one backend through one task at a time.
pub struct AgentDriver<'a> {
    config: &'a DriverConfig,
    cancel: &'a CancellationToken,
}

impl<'a> AgentDriver<'a> {
    pub fn new(config: &'a DriverConfig, cancel: &'a CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Run `task` to completion.
    ///
    /// Never fails: errors end the task early and are carried in the
    /// outcome together with whatever was extracted before them. The
    /// backend conversation is reset before returning.
    pub async fn run(
        &self,
        backend: &mut dyn Backend,
        browser: &mut dyn BrowserSession,
        task: &Task,
    ) -> TaskOutcome {
        let started = Instant::now();
        let mut session = ExtractionSession::new(task.clone(), &self.config.task_prompt);

        info!(backend = backend.name(), task = %task.name, url = %task.seed_url, "starting task");

        backend.set_guided(false);
        let completion = match self.converse(backend, browser, &mut session).await {
            LoopEnd::Finished => Completion::Normal,
            LoopEnd::Exhausted(Some(BackendError::Cancelled)) => {
                session.fail(BackendError::Cancelled);
                Completion::Normal
            }
            LoopEnd::Exhausted(error) => {
                if let Some(e) = error {
                    warn!(backend = backend.name(), task = %task.name, error = %e, "backend failed");
                    session.fail(e);
                }
                self.finish_exhausted(backend, &mut session).await
            }
        };

        backend.reset_conversation();
        let outcome = session.finish(started.elapsed(), completion);

        info!(
            backend = backend.name(),
            task = %task.name,
            records = outcome.records.len(),
            pages = outcome.metrics.pages_visited,
            turns = outcome.metrics.turns,
            duration_ms = outcome.metrics.elapsed.as_millis() as u64,
            failed = outcome.error.is_some(),
            "task finished"
        );

        outcome
    }

    async fn converse(
        &self,
        backend: &mut dyn Backend,
        browser: &mut dyn BrowserSession,
        session: &mut ExtractionSession,
    ) -> LoopEnd {
        let seed_url = session.task().seed_url.clone();
        let mut pending = vec![ModelAction::seed(seed_url.as_str())];
        let mut last_fetched = seed_url;

        for turn in 0..self.config.turn_limit {
            let mut done = true;
            // relative URLs refer to the last page the backend was shown
            let base = last_fetched.clone();

            'actions: for action in &pending {
                session.add_records(action.records());

                if action.urls().is_empty() {
                    backend.add_turn(Turn::answer(&action.call, ACKNOWLEDGEMENT));
                    continue;
                }
                done = false;

                for url in action.urls() {
                    let url = resolve_url(&base, url);
                    match self.fetch_page(browser, &url).await {
                        Ok(page) => {
                            debug!(
                                backend = backend.name(),
                                turn,
                                url = %url,
                                raw_length = page.raw_length,
                                reduced_length = page.reduced_length,
                                "page fetched"
                            );
                            session.record_page(&url, &page);
                            last_fetched = url;
                        }
                        Err(e) => {
                            warn!(backend = backend.name(), turn, url = %url, error = %e, "page fetch failed");
                            session.fail(e);
                            break 'actions;
                        }
                    }
                }

                backend.add_turn(Turn::answer(&action.call, session.prompt()));
            }

            if done || session.has_failed() || pending.is_empty() {
                return LoopEnd::Finished;
            }

            let sent = Instant::now();
            match backend.execute(self.cancel).await {
                Ok(execution) => {
                    let metrics = session.metrics_mut();
                    metrics.backend_time += execution.duration;
                    metrics.token_count = execution.token_count;
                    metrics.turns += 1;

                    debug!(
                        backend = backend.name(),
                        turn,
                        actions = execution.actions.len(),
                        tokens = execution.token_count,
                        duration_ms = execution.duration.as_millis() as u64,
                        "backend executed"
                    );

                    if turn + 1 == self.config.turn_limit {
                        for action in &execution.actions {
                            session.add_records(action.records());
                        }
                        info!(backend = backend.name(), turn, "turn limit reached");
                        return LoopEnd::Exhausted(None);
                    }
                    pending = execution.actions;
                }
                Err(e) => {
                    session.metrics_mut().backend_time += sent.elapsed();
                    return LoopEnd::Exhausted(Some(e));
                }
            }
        }

        LoopEnd::Finished
    }

    async fn finish_exhausted(
        &self,
        backend: &mut dyn Backend,
        session: &mut ExtractionSession,
    ) -> Completion {
        backend.reset_conversation();
        if !session.records().is_empty() {
            return Completion::Normal;
        }

        info!(
            backend = backend.name(),
            task = %session.task().name,
            pages = session.pages().len(),
            "nothing extracted, falling back to per-page extraction"
        );

        backend.force_extraction_only();
        let output = FallbackExtractor::new(self.cancel)
            .extract(backend, session.pages())
            .await;

        session.add_records(&output.records);
        let metrics = session.metrics_mut();
        metrics.backend_time += output.backend_time;
        metrics.token_limit_reached = true;

        Completion::ViaFallback
    }

    async fn fetch_page(
        &self,
        browser: &mut dyn BrowserSession,
        url: &str,
    ) -> FetchResult<ContentFetchResult> {
        browser.navigate(url, self.cancel).await?;
        let html = browser.raw_html().await?;
        reduce(&html).map_err(FetchError::from)
    }
}

/// Resolve a possibly relative URL against the page it was found on.
///
/// Anything that does not parse is passed through for the browser to reject.
fn resolve_url(base: &str, candidate: &str) -> String {
    Url::parse(base)
        .and_then(|base| base.join(candidate))
        .map(String::from)
        .unwrap_or_else(|_| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::testing::{BackendCall, MockLauncher, ScriptedBackend};
    use crate::traits::{BrowserLauncher, ToolMode};
    use crate::types::{CallRef, Record};

    const SEED: &str = "https://rooms.example/";

    fn launcher() -> MockLauncher {
        MockLauncher::new()
            .with_page(SEED, "<html><body><h1>Rooms</h1><a href=\"/tomb\">Tomb</a></body></html>")
            .with_page(
                "https://rooms.example/tomb",
                "<html><body><h2>Tomb</h2><p>60 minutes</p></body></html>",
            )
            .with_page(
                "https://rooms.example/heist",
                "<html><body><h2>Heist</h2></body></html>",
            )
    }

    fn navigate(id: &str, urls: &[&str]) -> ModelAction {
        ModelAction::navigate(
            CallRef::new(id, "more_content"),
            urls.iter().map(|u| u.to_string()).collect(),
        )
    }

    fn extract(id: &str, names: &[&str]) -> ModelAction {
        ModelAction::extraction(
            CallRef::new(id, "list_escape_rooms"),
            names.iter().map(|n| Record::named(*n)).collect(),
        )
    }

    async fn run(
        backend: &mut ScriptedBackend,
        launcher: &MockLauncher,
        config: &DriverConfig,
    ) -> TaskOutcome {
        let cancel = CancellationToken::new();
        let mut browser = launcher.open_session().await.unwrap();
        AgentDriver::new(config, &cancel)
            .run(backend, browser.as_mut(), &Task::new("Rooms", SEED))
            .await
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(resolve_url(SEED, "/tomb"), "https://rooms.example/tomb");
        assert_eq!(resolve_url(SEED, "https://other.example/x"), "https://other.example/x");
        assert_eq!(resolve_url("not a url", "/tomb"), "/tomb");
    }

    #[tokio::test]
    async fn test_extraction_completes_normally() {
        let mut backend = ScriptedBackend::new("gpt")
            .with_token_count(321)
            .then_respond(vec![navigate("1", &["/tomb"])])
            .then_respond(vec![extract("2", &["Tomb"])]);
        let log = backend.log();
        let launcher = launcher();

        let outcome = run(&mut backend, &launcher, &DriverConfig::default()).await;

        assert_eq!(outcome.completion, Completion::Normal);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.records, vec![Record::named("Tomb")]);
        assert_eq!(outcome.metrics.pages_visited, 2);
        assert_eq!(outcome.metrics.turns, 2);
        assert_eq!(outcome.metrics.token_count, 321);
        assert!(!outcome.metrics.token_limit_reached);
        assert_eq!(launcher.navigations(), [SEED, "https://rooms.example/tomb"]);

        let calls = log.calls();
        assert_eq!(calls.first(), Some(&BackendCall::SetGuided(false)));
        assert_eq!(calls.last(), Some(&BackendCall::Reset));
    }

    #[tokio::test]
    async fn test_prompt_buffer_accumulates_pages() {
        let mut backend = ScriptedBackend::new("gpt")
            .then_respond(vec![navigate("1", &["/tomb"])])
            .then_respond(vec![extract("2", &["Tomb"])]);
        let log = backend.log();

        run(&mut backend, &launcher(), &DriverConfig::default()).await;

        let turns = log.turns();
        // seed page, tomb page, acknowledgement of the extraction
        assert_eq!(turns.len(), 3);
        assert!(turns[0].reply_to.is_none());
        assert!(turns[0].text.starts_with(crate::pipeline::prompts::TASK_PROMPT));
        assert!(turns[1].text.starts_with(&turns[0].text));
        assert!(turns[1].text.contains("Current URL: https://rooms.example/tomb;"));
        assert_eq!(turns[1].reply_to, Some(CallRef::new("1", "more_content")));
        assert_eq!(turns[2].text, ACKNOWLEDGEMENT);
    }

    #[tokio::test]
    async fn test_turn_limit_caps_executions() {
        let mut backend = ScriptedBackend::new("gpt")
            .then_repeat(vec![navigate("n", &["/tomb"])]);
        let log = backend.log();
        let config = DriverConfig::default().with_turn_limit(3);

        let outcome = run(&mut backend, &launcher(), &config).await;

        // three main-loop executions, then fallback calls in extraction
        // mode for every page after the seed
        assert_eq!(outcome.metrics.turns, 3);
        assert_eq!(outcome.completion, Completion::ViaFallback);
        assert!(outcome.metrics.token_limit_reached);
        assert!(outcome.error.is_none());
        let main_loop = log
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::Execute { mode: ToolMode::Any }))
            .count();
        assert_eq!(main_loop, 3);
    }

    #[tokio::test]
    async fn test_zero_turn_limit_does_nothing() {
        let mut backend = ScriptedBackend::new("gpt");
        let log = backend.log();
        let launcher = launcher();
        let config = DriverConfig::default().with_turn_limit(0);

        let outcome = run(&mut backend, &launcher, &config).await;

        assert_eq!(outcome.completion, Completion::Normal);
        assert_eq!(log.executions(), 0);
        assert!(launcher.navigations().is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_triggers_fallback() {
        let mut backend = ScriptedBackend::new("gpt")
            .then_respond(vec![navigate("1", &["/tomb", "/heist"])])
            .then_fail(BackendError::Api {
                status: 400,
                message: "context length exceeded".into(),
            })
            .then_respond(vec![extract("f1", &["Tomb"])])
            .then_respond(vec![extract("f2", &["Heist"])]);
        let log = backend.log();

        let outcome = run(&mut backend, &launcher(), &DriverConfig::default()).await;

        assert_eq!(outcome.completion, Completion::ViaFallback);
        assert!(outcome.metrics.token_limit_reached);
        assert!(matches!(
            outcome.error,
            Some(TaskError::Backend(BackendError::Api { status: 400, .. }))
        ));
        let names: Vec<_> = outcome.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Tomb", "Heist"]);

        // fallback turns are the tomb and heist blocks, never the seed page
        let fallback_turns: Vec<_> = log
            .turns()
            .into_iter()
            .filter(|t| t.reply_to.is_none() && !t.text.starts_with(crate::pipeline::prompts::TASK_PROMPT))
            .collect();
        assert_eq!(fallback_turns.len(), 2);
        assert!(fallback_turns[0].text.starts_with("Current URL: https://rooms.example/tomb;"));
        assert!(log.calls().contains(&BackendCall::ForceExtractionOnly));
    }

    #[tokio::test]
    async fn test_first_execute_failure_ends_via_fallback() {
        let mut backend = ScriptedBackend::new("gpt").then_fail(BackendError::Network("connection reset".into()));
        let log = backend.log();
        let launcher = launcher();

        let outcome = run(&mut backend, &launcher, &DriverConfig::default()).await;

        assert_eq!(outcome.completion, Completion::ViaFallback);
        assert!(outcome.metrics.token_limit_reached);
        assert!(outcome.records.is_empty());
        assert!(matches!(
            outcome.error,
            Some(TaskError::Backend(BackendError::Network(_)))
        ));
        assert_eq!(launcher.navigations(), [SEED]);

        // only the seed page was fetched, and the fallback never sends it
        let calls = log.calls();
        assert!(calls.contains(&BackendCall::ForceExtractionOnly));
        assert_eq!(
            calls
                .iter()
                .filter(|c| matches!(c, BackendCall::Execute { mode: ToolMode::ExtractOnly }))
                .count(),
            0
        );
        assert_eq!(log.executions(), 1);
        assert_eq!(calls.last(), Some(&BackendCall::Reset));
    }

    #[tokio::test]
    async fn test_relative_urls_resolve_against_last_fetched_page() {
        let mut backend = ScriptedBackend::new("gpt")
            .then_respond(vec![navigate("1", &["/rooms/"])])
            .then_respond(vec![navigate("2", &["tomb"])])
            .then_respond(vec![extract("3", &["Tomb"])]);
        let launcher = launcher()
            .with_page("https://rooms.example/rooms/", "<html><body><a href=\"tomb\">Tomb</a></body></html>")
            .with_page("https://rooms.example/rooms/tomb", "<html><body><h2>Tomb</h2></body></html>");

        let outcome = run(&mut backend, &launcher, &DriverConfig::default()).await;

        assert!(outcome.error.is_none());
        assert_eq!(
            launcher.navigations(),
            [SEED, "https://rooms.example/rooms/", "https://rooms.example/rooms/tomb"]
        );
    }

    #[tokio::test]
    async fn test_backend_error_after_records_skips_fallback() {
        let mut backend = ScriptedBackend::new("gpt")
            .then_respond(vec![extract("1", &["Tomb"]), navigate("2", &["/heist"])])
            .then_fail(BackendError::NoChoices);
        let log = backend.log();

        let outcome = run(&mut backend, &launcher(), &DriverConfig::default()).await;

        assert_eq!(outcome.completion, Completion::Normal);
        assert_eq!(outcome.records, vec![Record::named("Tomb")]);
        assert!(!outcome.metrics.token_limit_reached);
        assert!(!log.calls().contains(&BackendCall::ForceExtractionOnly));
        assert!(matches!(outcome.error, Some(TaskError::Backend(BackendError::NoChoices))));
    }

    #[tokio::test]
    async fn test_fetch_error_keeps_partial_records() {
        let mut backend = ScriptedBackend::new("gpt")
            .then_respond(vec![extract("1", &["Tomb"]), navigate("2", &["/missing"])]);
        let log = backend.log();

        let outcome = run(&mut backend, &launcher(), &DriverConfig::default()).await;

        assert_eq!(outcome.records, vec![Record::named("Tomb")]);
        assert!(matches!(
            outcome.error,
            Some(TaskError::Fetch(FetchError::Navigate { .. }))
        ));
        assert_eq!(log.executions(), 1);
    }

    #[tokio::test]
    async fn test_empty_response_finishes() {
        let mut backend = ScriptedBackend::new("gpt").then_respond(vec![]);
        let log = backend.log();

        let outcome = run(&mut backend, &launcher(), &DriverConfig::default()).await;

        assert_eq!(outcome.completion, Completion::Normal);
        assert!(outcome.records.is_empty());
        assert!(outcome.error.is_none());
        assert_eq!(log.executions(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_task_stops_before_backend() {
        let mut backend = ScriptedBackend::new("gpt");
        let log = backend.log();
        let launcher = launcher();
        let config = DriverConfig::default();
        let cancel = CancellationToken::new();
        let mut browser = launcher.open_session().await.unwrap();
        cancel.cancel();

        // the seed fetch fails first because the mock browser honours
        // cancellation too
        let outcome = AgentDriver::new(&config, &cancel)
            .run(&mut backend, browser.as_mut(), &Task::new("Rooms", SEED))
            .await;

        assert!(matches!(outcome.error, Some(TaskError::Fetch(FetchError::Cancelled))));
        assert_eq!(outcome.completion, Completion::Normal);
        assert_eq!(log.executions(), 0);
    }
}
