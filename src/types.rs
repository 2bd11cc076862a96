//! Core data types shared across the agent loop, tools, and scheduler.
//!
//! The wire shapes follow the OpenAI chat-completions message model: an
//! assistant message may carry tool calls, and each tool result is echoed
//! back as a `tool`-role message correlated by call id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Roles and messages
// ---------------------------------------------------------------------------

/// Conversation participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (prompt or injected perception digest).
    System,
    /// Human user message.
    User,
    /// Assistant (LLM) message.
    Assistant,
    /// Tool result message, correlated to a prior tool call.
    Tool,
}

impl Role {
    /// String form used in persisted conversation rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }

    /// Parse from a persisted string value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

/// A request from the LLM to invoke a named tool.
///
/// Produced only when parsing an LLM response; immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, unique within a turn.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Tool arguments as a JSON object.
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// The outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Identifier of the call this result answers.
    pub tool_call_id: String,
    /// Tool name.
    pub name: String,
    /// Human-readable result text (never binary).
    pub content: String,
    /// Whether the invocation succeeded.
    pub success: bool,
}

impl ToolResult {
    /// Build a successful result.
    pub fn ok(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
            success: true,
        }
    }

    /// Build a failed result.
    pub fn fail(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
            success: false,
        }
    }
}

/// A message in a per-user conversation buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author role.
    pub role: Role,
    /// Plain text content, if any.
    pub content: Option<String>,
    /// Tool calls requested by an assistant message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Correlation id for `tool`-role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name for `tool`-role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn bare(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
            timestamp: Utc::now(),
        }
    }

    /// A system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::bare(Role::System, Some(text.into()))
    }

    /// A user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::bare(Role::User, Some(text.into()))
    }

    /// An assistant message with plain text.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::bare(Role::Assistant, Some(text.into()))
    }

    /// An assistant message carrying tool calls (text may be empty).
    pub fn assistant_with_calls(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::bare(Role::Assistant, text);
        msg.tool_calls = Some(calls);
        msg
    }

    /// A tool-role message answering the given result.
    ///
    /// Always carries the correlation id of the call it answers.
    pub fn tool(result: &ToolResult) -> Self {
        let mut msg = Self::bare(Role::Tool, Some(result.content.clone()));
        msg.tool_call_id = Some(result.tool_call_id.clone());
        msg.name = Some(result.name.clone());
        msg
    }
}

// ---------------------------------------------------------------------------
// Risk and autonomy levels
// ---------------------------------------------------------------------------

/// Static classification of a tool's potential for harm.
///
/// Attached to the tool definition, not to individual calls. Ordering is
/// meaningful: higher values require more approval friction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RiskLevel {
    /// Read-only or otherwise harmless.
    Safe = 0,
    /// Mutates user-visible state.
    Moderate = 1,
    /// Can cause damage outside the agent's own state.
    Dangerous = 2,
}

impl RiskLevel {
    /// Short label used in approval prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Moderate => "[!] moderate risk",
            Self::Dangerous => "[!!!] dangerous",
        }
    }
}

/// Runtime policy setting controlling approval friction.
///
/// Process-wide and mutable at runtime; see
/// [`AutonomyGate`](crate::agent::autonomy::AutonomyGate) for the decision
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AutonomyLevel {
    /// Every tool call requires approval.
    Paranoid = 0,
    /// Moderate and dangerous calls require approval.
    Careful = 1,
    /// Only dangerous calls require approval.
    Balanced = 2,
    /// No approval required.
    Autonomous = 3,
}

impl AutonomyLevel {
    /// Convert from the integer representation (config and atomic storage).
    pub fn from_repr(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Paranoid),
            1 => Some(Self::Careful),
            2 => Some(Self::Balanced),
            3 => Some(Self::Autonomous),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Paranoid => "paranoid",
            Self::Careful => "careful",
            Self::Balanced => "balanced",
            Self::Autonomous => "autonomous",
        }
    }
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

/// Identity of the caller on whose behalf a turn or tool call runs.
///
/// Injected into every tool invocation; tools may ignore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    /// Stable per-user key (conversation buffers, journal, task ownership).
    pub user_key: String,
    /// Display name, if known.
    pub name: Option<String>,
    /// Transport that produced the message (`console`, `scheduler`, ...).
    pub source_type: String,
    /// Transport-specific identifier, when distinct from the user key.
    pub source_id: Option<String>,
}

impl CallerInfo {
    /// Caller identity for a turn originating from a transport.
    pub fn new(user_key: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            user_key: user_key.into(),
            name: None,
            source_type: source_type.into(),
            source_id: None,
        }
    }

    /// Synthetic caller identity for scheduled executions.
    pub fn scheduler(user_key: impl Into<String>) -> Self {
        let key = user_key.into();
        Self {
            user_key: key.clone(),
            name: None,
            source_type: "scheduler".to_owned(),
            source_id: Some(key),
        }
    }
}
