//! Browser session implementations.
//!
//! [`HttpLauncher`] fetches pages with plain HTTP requests and is always
//! available. [`ChromiumLauncher`] renders pages in headless Chromium and is
//! behind the `chromium` cargo feature.

use std::time::Duration;

pub mod http;

#[cfg(feature = "chromium")]
pub mod chromium;

pub use http::{HttpLauncher, HttpSession};

#[cfg(feature = "chromium")]
pub use chromium::{ChromiumLauncher, ChromiumSession};

/// Browser-like User-Agent sent by every session.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Settings shared by the launchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserOptions {
    /// Upper bound for a single navigation. Default: 30s.
    pub page_timeout: Duration,

    /// Proxy for all page traffic, e.g. `http://127.0.0.1:8080`
    pub proxy_server: Option<String>,

    pub user_agent: String,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(30),
            proxy_server: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl BrowserOptions {
    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn with_proxy_server(mut self, proxy: impl Into<String>) -> Self {
        self.proxy_server = Some(proxy.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
