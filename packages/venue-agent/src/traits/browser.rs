//! Browser session contract.
//!
//! One session per worker, created once and reused for every task that
//! worker runs. Sessions are single-threaded: `&mut self` everywhere.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::FetchResult;

/// A page-at-a-time browsing session.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to `url` and wait for the page to settle.
    async fn navigate(&mut self, url: &str, cancel: &CancellationToken) -> FetchResult<()>;

    /// Raw HTML of the current page.
    async fn raw_html(&mut self) -> FetchResult<String>;
}

/// Opens browser sessions for workers.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open_session(&self) -> FetchResult<Box<dyn BrowserSession>>;
}
