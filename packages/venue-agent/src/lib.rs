//! Model-Driven Venue Extraction
//!
//! Visits venue websites and lets a language model decide which pages to
//! read, until it can list the venues (escape rooms) a site offers. Every
//! task runs against every configured backend concurrently, and results are
//! persisted per backend so runs can be compared and resumed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use venue_agent::{BackendRegistry, CsvStoreFactory, HttpLauncher, OpenAiBackend, Task, TaskRunner};
//!
//! let backends = BackendRegistry::new()
//!     .with(OpenAiBackend::openai(api_key, "gpt-4o-mini"));
//!
//! let runner = TaskRunner::new(
//!     Arc::new(HttpLauncher::default()),
//!     Arc::new(CsvStoreFactory::new("results")),
//! );
//!
//! runner
//!     .run(backends.into_backends(), vec![Task::new("Exit Games", "https://exit.example")])
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Backend, browser and store abstractions
//! - [`types`] - Tasks, actions, records and outcomes
//! - [`reducer`] - HTML reduction before pages reach a model
//! - [`security`] - Redacted API keys
//! - [`pipeline`] - Agent loop, fallback extraction and the runner
//! - [`backends`] - OpenAI-compatible, Anthropic and Gemini backends
//! - [`browsers`] - HTTP and (optional) Chromium sessions
//! - [`stores`] - CSV and in-memory result stores
//! - [`testing`] - Scripted backends and mock browsers

pub mod backends;
pub mod browsers;
pub mod error;
pub mod pipeline;
pub mod reducer;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{
    BackendError, FetchError, ReduceError, RunError, StoreError, TaskError, WorkerError,
    WorkerFailure,
};
pub use traits::{Backend, BrowserLauncher, BrowserSession, ResultStore, StoreFactory, ToolMode};
pub use types::{
    ActionKind, CallRef, Completion, DriverConfig, Execution, ModelAction, PersistedRecord,
    Record, SessionMetrics, Task, TaskOutcome, Turn,
};

pub use pipeline::{AgentDriver, FallbackExtractor, TaskRunner};
pub use reducer::{reduce, ContentFetchResult};
pub use security::ApiKey;

// Re-export implementations
pub use backends::{AnthropicBackend, BackendRegistry, GeminiBackend, OpenAiBackend};
pub use browsers::{BrowserOptions, HttpLauncher};
pub use stores::{CsvStoreFactory, MemoryStoreFactory};

#[cfg(feature = "chromium")]
pub use browsers::ChromiumLauncher;
