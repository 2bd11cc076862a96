//! OpenAI-compatible provider using the `/chat/completions` API.
//!
//! Works against api.openai.com and any server that mirrors the dialect
//! (LM Studio, Ollama's compat endpoint, vLLM). The base URL and model
//! are configuration; nothing here is OpenAI-specific beyond the wire
//! format.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::types::{Message, Role, ToolCall};

use super::{check_http_response, ChatReply, LlmProvider, ProviderError, ToolSchema, UsageStats};

/// Default cap on generated tokens per call.
const DEFAULT_MAX_TOKENS: u32 = 4096;

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Chat completions request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct WireRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<WireMessage>,
    /// Tool definitions in function-calling format.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    /// Maximum completion tokens.
    pub max_tokens: u32,
}

/// A message in chat-completions format.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct WireMessage {
    /// Role (`system`, `user`, `assistant`, `tool`).
    pub role: &'static str,
    /// Optional plain text content.
    pub content: Option<String>,
    /// Optional assistant tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    /// Correlation id when role is `tool`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// A tool call on the wire.
#[doc(hidden)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    /// Unique call identifier.
    pub id: String,
    /// Call type (always `function`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Function call payload.
    pub function: WireFunctionCall,
}

/// Function payload of a wire tool call.
#[doc(hidden)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionCall {
    /// Function name.
    pub name: String,
    /// Arguments encoded as a JSON string.
    pub arguments: String,
}

/// Chat completions response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct WireResponse {
    /// Response choices; only the first is consumed.
    pub choices: Vec<WireChoice>,
    /// Token usage.
    pub usage: Option<WireUsage>,
}

/// One response choice.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct WireChoice {
    /// Assistant message for this choice.
    pub message: WireResponseMessage,
}

/// Assistant message in a response.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct WireResponseMessage {
    /// Optional text content.
    pub content: Option<String>,
    /// Optional tool calls.
    pub tool_calls: Option<Vec<WireToolCall>>,
}

/// Usage statistics on the wire.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct WireUsage {
    /// Prompt token count.
    pub prompt_tokens: Option<u32>,
    /// Completion token count.
    pub completion_tokens: Option<u32>,
}

// ---------------------------------------------------------------------------
// Request / response mapping (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build a wire request from conversation messages and tool schemas.
#[doc(hidden)]
pub fn build_request(model: &str, messages: &[Message], tools: &[ToolSchema]) -> WireRequest {
    let wire_messages = messages
        .iter()
        .map(|msg| WireMessage {
            role: role_name(msg.role),
            content: msg.content.clone(),
            tool_calls: msg.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: "function".to_owned(),
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: Value::Object(call.arguments.clone()).to_string(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: msg.tool_call_id.clone(),
        })
        .collect();

    let wire_tools = tools
        .iter()
        .map(|schema| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": schema.name,
                    "description": schema.description,
                    "parameters": schema.parameters,
                }
            })
        })
        .collect();

    WireRequest {
        model: model.to_owned(),
        messages: wire_messages,
        tools: wire_tools,
        max_tokens: DEFAULT_MAX_TOKENS,
    }
}

/// Parse a wire response body into a [`ChatReply`].
///
/// # Errors
///
/// Returns [`ProviderError::Parse`] when the body cannot be deserialized
/// or a tool call carries invalid argument JSON.
#[doc(hidden)]
pub fn parse_response(body: &str) -> Result<ChatReply, ProviderError> {
    let resp: WireResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse("missing choices[0]".to_owned()))?;

    let text = choice.message.content.filter(|t| !t.is_empty());

    let mut tool_calls = Vec::new();
    for call in choice.message.tool_calls.unwrap_or_default() {
        let arguments = parse_arguments(&call.function.name, &call.function.arguments)?;
        tool_calls.push(ToolCall {
            id: call.id,
            name: call.function.name,
            arguments,
        });
    }

    let usage = resp.usage.map(|u| UsageStats {
        input_tokens: u.prompt_tokens.unwrap_or(0),
        output_tokens: u.completion_tokens.unwrap_or(0),
    });

    Ok(ChatReply {
        text,
        tool_calls,
        usage,
    })
}

/// Decode the JSON-string argument payload of one tool call.
fn parse_arguments(
    name: &str,
    raw: &str,
) -> Result<serde_json::Map<String, Value>, ProviderError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        ProviderError::Parse(format!("invalid tool call arguments for '{name}': {e}"))
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ProviderError::Parse(format!(
            "tool call arguments for '{name}' are not an object: {other}"
        ))),
    }
}

fn role_name(role: Role) -> &'static str {
    role.as_str()
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Provider for OpenAI-compatible chat completion endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a provider instance.
    ///
    /// `base_url` is the API root including the version prefix, e.g.
    /// `https://api.openai.com/v1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            model: model.into(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ChatReply, ProviderError> {
        let request = build_request(&self.model, messages, tools);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let payload = check_http_response(response).await?;
        parse_response(&payload)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
