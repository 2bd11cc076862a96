//! Tool abstraction and registry.
//!
//! A tool is a named, schema-described operation the model can request.
//! Each tool declares a [`RiskLevel`] that the autonomy gate uses to
//! decide whether the call needs user approval. Registration is explicit:
//! the registry is built once at startup and handed to the agent
//! behind an `Arc`; plugin sources register through the same call.

pub mod schedule;
pub mod shell;
pub mod status;
pub mod web_fetch;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::providers::ToolSchema;
use crate::types::{CallerInfo, RiskLevel, ToolCall, ToolResult};

/// A named operation the agent can invoke on the model's request.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &'static str;

    /// Description shown to the LLM.
    fn description(&self) -> &'static str;

    /// JSON Schema object describing the tool's parameters.
    fn parameters(&self) -> serde_json::Value;

    /// Static risk classification used by the autonomy gate.
    fn risk(&self) -> RiskLevel;

    /// Execute the call on behalf of `caller`.
    ///
    /// Tools read their arguments from `call.arguments` and may ignore
    /// the caller identity.
    ///
    /// # Errors
    ///
    /// Errors are caught by the dispatcher and converted into failed
    /// results; a tool must not leak partially applied effects when it
    /// errors.
    async fn execute(&self, call: &ToolCall, caller: &CallerInfo) -> anyhow::Result<ToolResult>;
}

/// Name-keyed tool registry.
///
/// A `BTreeMap` keeps listing order deterministic for prompts, error
/// messages, and tests.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        info!(tool = tool.name(), risk = ?tool.risk(), "tool registered");
        self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Export all tools as schemas for the provider.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameters(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Argument helpers shared by the built-in tools
// ---------------------------------------------------------------------------

/// Read a required string argument.
pub(crate) fn require_str<'a>(call: &'a ToolCall, key: &str) -> anyhow::Result<&'a str> {
    call.arguments
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing required argument '{key}'"))
}

/// Read an optional string argument.
pub(crate) fn opt_str<'a>(call: &'a ToolCall, key: &str) -> Option<&'a str> {
    call.arguments
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Read an optional integer argument.
pub(crate) fn opt_i64(call: &ToolCall, key: &str) -> Option<i64> {
    call.arguments.get(key).and_then(|v| v.as_i64())
}

/// Read an optional boolean argument.
pub(crate) fn opt_bool(call: &ToolCall, key: &str) -> Option<bool> {
    call.arguments.get(key).and_then(|v| v.as_bool())
}
