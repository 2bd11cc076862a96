//! HTTP GET tool for reading text content from the web.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::types::{CallerInfo, RiskLevel, ToolCall, ToolResult};

use super::{require_str, Tool};

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Response body cap, in characters.
const MAX_CONTENT_CHARS: usize = 30_000;

/// Fetches a URL and returns its text content.
pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    /// Create the tool with the given user agent and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Create the tool with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_defaults() -> anyhow::Result<Self> {
        Self::new("straylight/0.1", Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &'static str {
        "web_fetch"
    }

    fn description(&self) -> &'static str {
        "Fetch a web page by URL and return its text content. Useful for \
         reading documentation and articles."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "URL to fetch"},
            },
            "required": ["url"],
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Safe
    }

    async fn execute(&self, call: &ToolCall, _caller: &CallerInfo) -> anyhow::Result<ToolResult> {
        let raw_url = match require_str(call, "url") {
            Ok(u) => u,
            Err(e) => return Ok(ToolResult::fail(&call.id, self.name(), e.to_string())),
        };

        let url = match Url::parse(raw_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => {
                return Ok(ToolResult::fail(
                    &call.id,
                    self.name(),
                    format!("unsupported URL scheme '{}'", url.scheme()),
                ))
            }
            Err(e) => {
                return Ok(ToolResult::fail(
                    &call.id,
                    self.name(),
                    format!("invalid URL '{raw_url}': {e}"),
                ))
            }
        };

        info!(url = %url, "fetching URL");

        let response = match self.client.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                return Ok(ToolResult::fail(
                    &call.id,
                    self.name(),
                    format!("failed to fetch {url}: {e}"),
                ))
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(ToolResult::fail(
                &call.id,
                self.name(),
                format!("HTTP error {status} for {url}"),
            ));
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return Ok(ToolResult::fail(
                    &call.id,
                    self.name(),
                    format!("failed to read body from {url}: {e}"),
                ))
            }
        };

        let body = crate::agent::journal::truncate_chars(&text, MAX_CONTENT_CHARS);
        Ok(ToolResult::ok(
            &call.id,
            self.name(),
            format!("URL: {url}\n\n{body}"),
        ))
    }
}
