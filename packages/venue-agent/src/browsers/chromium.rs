//! Headless Chromium sessions via `chromiumoxide`.
//!
//! Each session launches its own browser process with a single page, so
//! workers never share a tab.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::BrowserOptions;
use crate::error::{FetchError, FetchResult};
use crate::traits::browser::{BrowserLauncher, BrowserSession};

/// Launches one headless Chromium per session.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    options: BrowserOptions,
    executable: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self {
            options,
            executable: None,
        }
    }

    /// Use a specific Chromium binary instead of the one found on `PATH`.
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    fn config(&self) -> Result<BrowserConfig, String> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.options.page_timeout)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg(format!("--user-agent={}", self.options.user_agent));

        if let Some(proxy) = &self.options.proxy_server {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }

        builder.build()
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn open_session(&self) -> FetchResult<Box<dyn BrowserSession>> {
        let config = self.config().map_err(FetchError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "chromium handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Launch(e.to_string()))?;

        Ok(Box::new(ChromiumSession {
            _browser: browser,
            page,
            handler,
            timeout: self.options.page_timeout,
        }))
    }
}

/// A Chromium process with one page.
pub struct ChromiumSession {
    _browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    timeout: std::time::Duration,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, cancel: &CancellationToken) -> FetchResult<()> {
        let navigate_error = |reason: String| FetchError::Navigate {
            url: url.to_string(),
            reason,
        };

        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = tokio::time::timeout(self.timeout, navigation) => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(navigate_error(e.to_string())),
                Err(_) => Err(navigate_error(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                ))),
            },
        }
    }

    async fn raw_html(&mut self) -> FetchResult<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .map_err(|e| FetchError::Content(e.to_string()))?;

        result
            .into_value()
            .map_err(|e| FetchError::Content(format!("unexpected page content: {e:?}")))
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        debug!("closing chromium session");
        self.handler.abort();
    }
}
