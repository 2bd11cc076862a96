//! LLM provider abstraction layer.
//!
//! Defines the [`LlmProvider`] trait and the shared reply types the agent
//! loop consumes. A reply may carry text, zero or more tool calls, or
//! nothing at all; the loop handles every combination.
//!
//! One provider is implemented: [`openai::OpenAiCompatProvider`] for any
//! endpoint speaking the `/chat/completions` dialect (OpenAI, and the
//! many local servers that mirror it).

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{Message, ToolCall};

pub mod openai;

// ---------------------------------------------------------------------------
// Schemas and replies
// ---------------------------------------------------------------------------

/// JSON-Schema description of a tool offered to the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name (must match registry registration).
    pub name: String,
    /// Description shown to the LLM.
    pub description: String,
    /// JSON Schema object for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageStats {
    /// Tokens consumed by the prompt.
    pub input_tokens: u32,
    /// Tokens generated in the reply.
    pub output_tokens: u32,
}

/// A parsed provider reply.
#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    /// Plain text, if the model produced any.
    pub text: Option<String>,
    /// Requested tool calls, in the order the model issued them.
    pub tool_calls: Vec<ToolCall>,
    /// Usage statistics, when reported.
    pub usage: Option<UsageStats>,
}

impl ChatReply {
    /// Whether the reply requests at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by model providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match the expected schema.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// Upstream responded with a non-success status.
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Core LLM provider interface.
///
/// Implementations must tolerate an empty `tools` slice (no forced tool
/// use) and may return zero, one, or multiple tool calls per reply.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send the conversation and receive a reply.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on API, network, or parse failure.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ChatReply, ProviderError>;

    /// The model identifier this provider is configured for.
    fn model_id(&self) -> &str;
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Check HTTP response status and return the body or a structured error.
///
/// # Errors
///
/// Returns [`ProviderError::Request`] on transport failure and
/// [`ProviderError::HttpStatus`] on a non-2xx status.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

/// Collapse whitespace, redact credential-shaped substrings, and bound
/// the length of an upstream error body before it reaches logs.
fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"sk-[A-Za-z0-9]{20,}",
        r"sk-ant-[A-Za-z0-9_\-]{10,}",
        r"Bearer [A-Za-z0-9._\-]{16,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}
