//! Autonomy gate: decides when a tool call needs user approval.
//!
//! The decision is a pure function of the process-wide [`AutonomyLevel`]
//! and the tool's [`RiskLevel`]:
//!
//! | Level      | Safe    | Moderate | Dangerous |
//! |------------|---------|----------|-----------|
//! | Paranoid   | require | require  | require   |
//! | Careful    | approve | require  | require   |
//! | Balanced   | approve | approve  | require   |
//! | Autonomous | approve | approve  | approve   |
//!
//! When approval is required the gate asks the registered transport. With
//! no transport registered it approves automatically and logs a warning;
//! a documented availability trade-off, not a silent bug. Rejection on
//! timeout is the transport's responsibility.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::interfaces::Interface;
use crate::types::{AutonomyLevel, RiskLevel, ToolCall};

/// Maximum arguments rendered in an approval prompt.
const MAX_PROMPT_ARGS: usize = 5;

/// Maximum characters of a single rendered argument value.
const MAX_ARG_VALUE_CHARS: usize = 120;

/// Whether a call at `risk` requires approval under `level`.
///
/// This is the whole policy; the gate only adds the asking machinery.
pub fn approval_required(level: AutonomyLevel, risk: RiskLevel) -> bool {
    match level {
        AutonomyLevel::Paranoid => true,
        AutonomyLevel::Careful => risk >= RiskLevel::Moderate,
        AutonomyLevel::Balanced => risk >= RiskLevel::Dangerous,
        AutonomyLevel::Autonomous => false,
    }
}

/// Risk-gated approval policy with an injected transport callback.
///
/// The level is stored atomically so it can be changed at runtime without
/// blocking in-flight turns.
pub struct AutonomyGate {
    level: AtomicU8,
    transport: RwLock<Option<Arc<dyn Interface>>>,
}

impl std::fmt::Debug for AutonomyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutonomyGate")
            .field("level", &self.level())
            .finish_non_exhaustive()
    }
}

impl AutonomyGate {
    /// Create a gate at the given starting level, with no transport yet.
    pub fn new(level: AutonomyLevel) -> Self {
        Self {
            level: AtomicU8::new(level as u8),
            transport: RwLock::new(None),
        }
    }

    /// Current autonomy level.
    pub fn level(&self) -> AutonomyLevel {
        AutonomyLevel::from_repr(self.level.load(Ordering::Relaxed))
            .unwrap_or(AutonomyLevel::Careful)
    }

    /// Change the autonomy level at runtime.
    pub fn set_level(&self, level: AutonomyLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
        info!(level = level.name(), "autonomy level changed");
    }

    /// Register the transport used to ask the user for approval.
    pub fn set_approval_transport(&self, transport: Arc<dyn Interface>) {
        match self.transport.write() {
            Ok(mut slot) => *slot = Some(transport),
            Err(e) => warn!(error = %e, "approval transport lock poisoned"),
        }
    }

    /// Whether a call at `risk` currently requires approval.
    pub fn needs_approval(&self, risk: RiskLevel) -> bool {
        approval_required(self.level(), risk)
    }

    /// Ask the user to approve `call`, if the current level requires it.
    ///
    /// Returns `true` when the call may proceed. Approval-channel failures
    /// (no transport, or the transport erroring while asking) fail open
    /// with a logged warning; an explicit user rejection or a transport
    /// timeout returns `false`.
    pub async fn request_approval(
        &self,
        user_key: &str,
        call: &ToolCall,
        risk: RiskLevel,
    ) -> bool {
        if !self.needs_approval(risk) {
            return true;
        }

        let transport = match self.transport.read() {
            Ok(slot) => slot.clone(),
            Err(e) => {
                warn!(error = %e, "approval transport lock poisoned, approving");
                return true;
            }
        };

        let Some(transport) = transport else {
            warn!(tool = %call.name, "no approval transport registered, approving automatically");
            return true;
        };

        info!(tool = %call.name, user_key, risk = risk.label(), "requesting approval");
        let question = format_approval_message(call, risk);
        match transport.ask_approval(user_key, &question).await {
            Ok(approved) => approved,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "approval channel failed, approving");
                true
            }
        }
    }
}

/// Render the confirmation prompt for a pending tool call.
pub fn format_approval_message(call: &ToolCall, risk: RiskLevel) -> String {
    let args = format_call_args(call);
    format!(
        "Approval requested:\n[tool] {}({args})\nRisk: {}\n\nAllow this call?",
        call.name,
        risk.label(),
    )
}

/// Compactly format call arguments for the approval UI.
fn format_call_args(call: &ToolCall) -> String {
    if call.arguments.is_empty() {
        return String::new();
    }

    let mut parts: Vec<String> = call
        .arguments
        .iter()
        .take(MAX_PROMPT_ARGS)
        .map(|(key, value)| format!("{key}={}", format_arg_value(value)))
        .collect();

    let hidden = call.arguments.len().saturating_sub(MAX_PROMPT_ARGS);
    if hidden > 0 {
        parts.push(format!("... +{hidden} args"));
    }
    parts.join(", ")
}

/// Short, safe rendering of a single argument value.
fn format_arg_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => {
            let compact = s.split_whitespace().collect::<Vec<_>>().join(" ");
            if compact.chars().count() > MAX_ARG_VALUE_CHARS {
                let preview: String = compact.chars().take(MAX_ARG_VALUE_CHARS).collect();
                format!("'{preview}...'(len={})", compact.chars().count())
            } else {
                format!("{compact:?}")
            }
        }
        serde_json::Value::Object(map) => {
            let keys: Vec<&str> = map.keys().take(5).map(String::as_str).collect();
            format!("<object keys={keys:?}>")
        }
        serde_json::Value::Array(items) => format!("<array len={}>", items.len()),
        other => other.to_string(),
    }
}
