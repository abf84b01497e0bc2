//! Testing utilities including mock implementations.
//!
//! These let applications exercise the driver and runner without model
//! calls or network access. Call logs are shared handles, so they can still
//! be inspected after a double has been moved into a worker.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{BackendError, BackendResult, FetchError, FetchResult};
use crate::traits::backend::{Backend, ToolMode};
use crate::traits::browser::{BrowserLauncher, BrowserSession};
use crate::types::{Execution, ModelAction, Turn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// Backend
// =============================================================================

/// Record of a call made to a [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    AddTurn(Turn),
    Execute { mode: ToolMode },
    Reset,
    SetGuided(bool),
    ForceExtractionOnly,
}

/// Shared view of a [`ScriptedBackend`]'s calls.
#[derive(Debug, Clone, Default)]
pub struct BackendLog {
    calls: Arc<Mutex<Vec<BackendCall>>>,
}

impl BackendLog {
    fn push(&self, call: BackendCall) {
        lock(&self.calls).push(call);
    }

    /// Every call, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    /// Number of `execute` calls.
    pub fn executions(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, BackendCall::Execute { .. }))
            .count()
    }

    /// Turns added, in order.
    pub fn turns(&self) -> Vec<Turn> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                BackendCall::AddTurn(turn) => Some(turn.clone()),
                _ => None,
            })
            .collect()
    }
}

/// A backend that replays queued responses.
///
/// Each `execute` pops the next scripted step. Once the script is exhausted
/// it answers with the repeat actions if set, otherwise with no actions.
pub struct ScriptedBackend {
    name: String,
    image_support: bool,
    script: VecDeque<BackendResult<Vec<ModelAction>>>,
    repeat: Option<Vec<ModelAction>>,
    token_count: u64,
    duration: Duration,
    mode: ToolMode,
    log: BackendLog,
}

impl ScriptedBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_support: false,
            script: VecDeque::new(),
            repeat: None,
            token_count: 100,
            duration: Duration::from_millis(10),
            mode: ToolMode::default(),
            log: BackendLog::default(),
        }
    }

    /// Queue a successful execution returning `actions`.
    pub fn then_respond(mut self, actions: Vec<ModelAction>) -> Self {
        self.script.push_back(Ok(actions));
        self
    }

    /// Queue a failing execution.
    pub fn then_fail(mut self, error: BackendError) -> Self {
        self.script.push_back(Err(error));
        self
    }

    /// Answer every execution after the script with `actions`.
    pub fn then_repeat(mut self, actions: Vec<ModelAction>) -> Self {
        self.repeat = Some(actions);
        self
    }

    pub fn with_image_support(mut self, enabled: bool) -> Self {
        self.image_support = enabled;
        self
    }

    /// Token count reported by every execution (default 100).
    pub fn with_token_count(mut self, token_count: u64) -> Self {
        self.token_count = token_count;
        self
    }

    /// Duration reported by every execution (default 10ms).
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Handle on the call log.
    pub fn log(&self) -> BackendLog {
        self.log.clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_images(&self) -> bool {
        self.image_support
    }

    fn add_turn(&mut self, turn: Turn) {
        self.log.push(BackendCall::AddTurn(turn));
    }

    async fn execute(&mut self, cancel: &CancellationToken) -> BackendResult<Execution> {
        self.log.push(BackendCall::Execute { mode: self.mode });
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        let actions = match self.script.pop_front() {
            Some(step) => step?,
            None => self.repeat.clone().unwrap_or_default(),
        };

        Ok(Execution {
            actions,
            duration: self.duration,
            token_count: self.token_count,
        })
    }

    fn reset_conversation(&mut self) {
        self.log.push(BackendCall::Reset);
    }

    fn set_guided(&mut self, guided: bool) {
        self.log.push(BackendCall::SetGuided(guided));
        self.mode = if guided {
            ToolMode::Navigate
        } else {
            ToolMode::Any
        };
    }

    fn force_extraction_only(&mut self) {
        self.log.push(BackendCall::ForceExtractionOnly);
        self.mode = ToolMode::ExtractOnly;
    }
}

// =============================================================================
// Browser
// =============================================================================

/// Canned pages shared by a [`MockLauncher`] and its sessions.
#[derive(Debug, Clone, Default)]
struct SiteMap {
    pages: HashMap<String, String>,
    failing: HashSet<String>,
}

/// A browser session serving canned HTML by URL.
///
/// Unknown URLs and URLs marked failing return [`FetchError::Navigate`].
pub struct MockBrowser {
    site: Arc<SiteMap>,
    navigations: Arc<Mutex<Vec<String>>>,
    current: Option<String>,
}

#[async_trait]
impl BrowserSession for MockBrowser {
    async fn navigate(&mut self, url: &str, cancel: &CancellationToken) -> FetchResult<()> {
        lock(&self.navigations).push(url.to_string());
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        if self.site.failing.contains(url) {
            return Err(FetchError::Navigate {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let html = self.site.pages.get(url).ok_or_else(|| FetchError::Navigate {
            url: url.to_string(),
            reason: "HTTP 404 Not Found".to_string(),
        })?;
        self.current = Some(html.clone());
        Ok(())
    }

    async fn raw_html(&mut self) -> FetchResult<String> {
        self.current
            .clone()
            .ok_or_else(|| FetchError::Content("no page loaded".to_string()))
    }
}

/// Opens [`MockBrowser`] sessions over one set of canned pages.
#[derive(Default)]
pub struct MockLauncher {
    site: SiteMap,
    fail_launch: bool,
    navigations: Arc<Mutex<Vec<String>>>,
    sessions: Arc<Mutex<usize>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` at `url`.
    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.site.pages.insert(url.into(), html.into());
        self
    }

    /// Make navigation to `url` fail.
    pub fn fail_url(mut self, url: impl Into<String>) -> Self {
        self.site.failing.insert(url.into());
        self
    }

    /// Make `open_session` fail.
    pub fn fail_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    /// URLs navigated by any session, in order.
    pub fn navigations(&self) -> Vec<String> {
        lock(&self.navigations).clone()
    }

    /// Number of sessions opened.
    pub fn sessions_opened(&self) -> usize {
        *lock(&self.sessions)
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn open_session(&self) -> FetchResult<Box<dyn BrowserSession>> {
        if self.fail_launch {
            return Err(FetchError::Launch("mock launch failure".to_string()));
        }
        *lock(&self.sessions) += 1;

        Ok(Box::new(MockBrowser {
            site: Arc::new(self.site.clone()),
            navigations: Arc::clone(&self.navigations),
            current: None,
        }))
    }
}
