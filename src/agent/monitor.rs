//! Lightweight in-memory runtime metrics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tracing::warn;

use crate::providers::UsageStats;

/// Counters for messages, LLM calls, tool calls, and errors.
///
/// All counters are atomics; the per-tool map sits behind a short-lived
/// sync [`Mutex`].
pub struct AgentMonitor {
    started: Instant,
    messages: AtomicU64,
    llm_calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    errors: AtomicU64,
    tool_calls: Mutex<HashMap<String, u64>>,
}

impl std::fmt::Debug for AgentMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentMonitor")
            .field("messages", &self.messages.load(Ordering::Relaxed))
            .field("llm_calls", &self.llm_calls.load(Ordering::Relaxed))
            .field("errors", &self.errors.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl AgentMonitor {
    /// Create a monitor starting now.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            messages: AtomicU64::new(0),
            llm_calls: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            tool_calls: Mutex::new(HashMap::new()),
        }
    }

    /// Record an inbound message.
    pub fn record_message(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an LLM call and its token usage.
    pub fn record_llm_call(&self, usage: Option<UsageStats>) {
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(usage) = usage {
            self.input_tokens
                .fetch_add(u64::from(usage.input_tokens), Ordering::Relaxed);
            self.output_tokens
                .fetch_add(u64::from(usage.output_tokens), Ordering::Relaxed);
        }
    }

    /// Record a successful tool call.
    pub fn record_tool_call(&self, name: &str) {
        match self.tool_calls.lock() {
            Ok(mut map) => {
                let count = map.entry(name.to_owned()).or_insert(0);
                *count = count.saturating_add(1);
            }
            Err(e) => warn!(error = %e, "monitor lock poisoned in record_tool_call"),
        }
    }

    /// Record an error.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Messages processed so far.
    pub fn message_count(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    /// Errors recorded so far.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Render a status report.
    pub fn build_report(&self, active_conversations: usize) -> String {
        let uptime = self.started.elapsed();
        let total_secs = uptime.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        let top_tools = {
            let mut entries: Vec<(String, u64)> = match self.tool_calls.lock() {
                Ok(map) => map.iter().map(|(k, v)| (k.clone(), *v)).collect(),
                Err(_) => Vec::new(),
            };
            entries.sort_by(|a, b| b.1.cmp(&a.1));
            let rendered: Vec<String> = entries
                .iter()
                .take(5)
                .map(|(name, count)| format!("{name}({count})"))
                .collect();
            if rendered.is_empty() {
                "none".to_owned()
            } else {
                rendered.join(", ")
            }
        };

        let input = self.input_tokens.load(Ordering::Relaxed);
        let output = self.output_tokens.load(Ordering::Relaxed);
        format!(
            "Status report\n\
             - Uptime: {hours:02}:{minutes:02}:{seconds:02}\n\
             - Messages: {}\n\
             - Active conversations: {active_conversations}\n\
             - LLM calls: {}\n\
             - Tokens: {} in / {} out\n\
             - Tools: {top_tools}\n\
             - Errors: {}",
            self.messages.load(Ordering::Relaxed),
            self.llm_calls.load(Ordering::Relaxed),
            input,
            output,
            self.errors.load(Ordering::Relaxed),
        )
    }
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self::new()
    }
}
