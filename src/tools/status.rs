//! Tool exposing the journal to the model: what happened recently.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::journal::{ActionJournal, EventKind, JournalEntry};
use crate::types::{CallerInfo, RiskLevel, ToolCall, ToolResult};

use super::{opt_i64, opt_str, Tool};

/// Default number of events rendered.
const DEFAULT_LIMIT: usize = 10;

/// Detail truncation in the rendered output.
const DETAIL_CHARS: usize = 200;

/// Lets the model inspect recent deliveries, tool outcomes, and errors.
pub struct CheckStatusTool {
    journal: Arc<ActionJournal>,
}

impl CheckStatusTool {
    /// Create the tool over the shared journal.
    pub fn new(journal: Arc<ActionJournal>) -> Self {
        Self { journal }
    }
}

#[async_trait]
impl Tool for CheckStatusTool {
    fn name(&self) -> &'static str {
        "check_status"
    }

    fn description(&self) -> &'static str {
        "Check the status of recent actions: message deliveries, errors, and \
         tool call outcomes."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "scope": {
                    "type": "string",
                    "enum": ["my_errors", "all_errors", "deliveries", "full"],
                    "default": "full",
                },
                "limit": {"type": "integer", "default": DEFAULT_LIMIT},
            },
            "required": [],
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Safe
    }

    async fn execute(&self, call: &ToolCall, caller: &CallerInfo) -> anyhow::Result<ToolResult> {
        let scope = opt_str(call, "scope").unwrap_or("full");
        let limit = opt_i64(call, "limit")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_LIMIT)
            .max(1);

        let events: Vec<JournalEntry> = match scope {
            "my_errors" => self
                .journal
                .recent_errors(None, limit)
                .into_iter()
                .filter(|e| e.user_key.as_deref() == Some(caller.user_key.as_str()))
                .collect(),
            "all_errors" => self.journal.recent_errors(None, limit),
            "deliveries" => {
                let deliveries: Vec<JournalEntry> = self
                    .journal
                    .for_user(&caller.user_key, self.journal.capacity())
                    .into_iter()
                    .filter(|e| {
                        matches!(e.kind, EventKind::DeliveryOk | EventKind::DeliveryFail)
                    })
                    .collect();
                let skip = deliveries.len().saturating_sub(limit);
                deliveries.into_iter().skip(skip).collect()
            }
            _ => self.journal.for_user(&caller.user_key, limit),
        };

        if events.is_empty() {
            return Ok(ToolResult::ok(&call.id, self.name(), "No events found."));
        }

        let mut lines = Vec::new();
        for event in &events {
            let time = event.timestamp.format("%Y-%m-%d %H:%M:%S");
            let owner = event
                .user_key
                .as_deref()
                .map(|key| format!(" [user: {key}]"))
                .unwrap_or_default();
            lines.push(format!("[{time}] {}: {}{owner}", event.kind.tag(), event.summary));
            if scope == "full" {
                if let Some(details) = &event.details {
                    lines.push(format!(
                        "  Details: {}",
                        crate::agent::journal::truncate_chars(details, DETAIL_CHARS)
                    ));
                }
            }
        }

        Ok(ToolResult::ok(&call.id, self.name(), lines.join("\n")))
    }
}
