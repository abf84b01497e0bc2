//! Plain HTTP browser sessions.
//!
//! No JavaScript rendering; use for sites that serve their content as static
//! HTML.

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::BrowserOptions;
use crate::error::{FetchError, FetchResult};
use crate::traits::browser::{BrowserLauncher, BrowserSession};

/// Opens [`HttpSession`]s.
#[derive(Debug, Clone, Default)]
pub struct HttpLauncher {
    options: BrowserOptions,
}

impl HttpLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }

    fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        let mut builder = reqwest::Client::builder()
            .timeout(self.options.page_timeout)
            .user_agent(self.options.user_agent.as_str())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5));

        if let Some(proxy) = &self.options.proxy_server {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }

        builder.build()
    }
}

#[async_trait]
impl BrowserLauncher for HttpLauncher {
    async fn open_session(&self) -> FetchResult<Box<dyn BrowserSession>> {
        let client = self
            .build_client()
            .map_err(|e| FetchError::Launch(e.to_string()))?;
        Ok(Box::new(HttpSession::new(client)))
    }
}

/// One HTTP "tab": remembers the body of the last successful navigation.
pub struct HttpSession {
    client: reqwest::Client,
    current: Option<String>,
}

impl HttpSession {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            current: None,
        }
    }

    async fn fetch(&self, url: &str) -> FetchResult<String> {
        let navigate_error = |reason: String| FetchError::Navigate {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| navigate_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(navigate_error(format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Content(e.to_string()))
    }
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn navigate(&mut self, url: &str, cancel: &CancellationToken) -> FetchResult<()> {
        debug!(url = %url, "HTTP navigate");
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            body = self.fetch(url) => body?,
        };
        self.current = Some(body);
        Ok(())
    }

    async fn raw_html(&mut self) -> FetchResult<String> {
        self.current
            .clone()
            .ok_or_else(|| FetchError::Content("no page loaded".to_string()))
    }
}
