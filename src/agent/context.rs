//! System prompt assembly.

use chrono::{DateTime, Utc};

use crate::types::{AutonomyLevel, CallerInfo, Message};

/// Inputs for assembling the system prompt.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    /// Agent display name.
    pub agent_name: &'a str,
    /// Persona text from configuration.
    pub persona: &'a str,
    /// Names of the registered tools.
    pub tool_names: &'a [String],
    /// Current autonomy level.
    pub autonomy: AutonomyLevel,
    /// Caller the turn runs for.
    pub caller: &'a CallerInfo,
    /// Current time.
    pub now: DateTime<Utc>,
}

/// Build the full system prompt from persona, environment, and caller.
pub fn build_system_prompt(ctx: &PromptContext<'_>) -> String {
    let mut sections = Vec::new();

    sections.push(format!("You are {}. {}", ctx.agent_name, ctx.persona));

    sections.push(format!(
        "# Settings\n- Name: {}\n- Autonomy level: {}",
        ctx.agent_name,
        ctx.autonomy.name(),
    ));

    let tools = if ctx.tool_names.is_empty() {
        "none".to_owned()
    } else {
        ctx.tool_names.join(", ")
    };
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "unknown".to_owned());
    sections.push(format!(
        "# Environment\n- OS: {}\n- Working directory: {cwd}\n- Available tools: {tools}",
        std::env::consts::OS,
    ));

    let mut user_lines = vec![
        "# Current user".to_owned(),
        format!("- Key: {}", ctx.caller.user_key),
    ];
    if let Some(name) = &ctx.caller.name {
        user_lines.push(format!("- Name: {name}"));
    }
    user_lines.push(format!("- Source: {}", ctx.caller.source_type));
    sections.push(user_lines.join("\n"));

    sections.push(format!(
        "# Time\nCurrent time: {}",
        ctx.now.format("%Y-%m-%d %H:%M:%S UTC"),
    ));

    sections.join("\n\n---\n\n")
}

/// Prepend the system prompt to the conversation for one LLM call.
pub fn assemble_messages(system_prompt: &str, conversation: &[Message]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(conversation.len().saturating_add(1));
    messages.push(Message::system(system_prompt));
    messages.extend_from_slice(conversation);
    messages
}
