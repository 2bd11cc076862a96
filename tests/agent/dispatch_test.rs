//! Tool dispatch: resolution, gating, result normalization, journaling.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use straylight::agent::autonomy::AutonomyGate;
use straylight::agent::journal::{ActionJournal, EventKind};
use straylight::agent::monitor::AgentMonitor;
use straylight::agent::{Agent, AgentDeps};
use straylight::interfaces::Interface;
use straylight::providers::{ChatReply, LlmProvider, ProviderError, ToolSchema};
use straylight::tools::{Tool, ToolRegistry};
use straylight::types::{
    AutonomyLevel, CallerInfo, Message, RiskLevel, ToolCall, ToolResult,
};

// ---------------------------------------------------------------------------
// Minimal collaborators
// ---------------------------------------------------------------------------

struct SilentProvider;

#[async_trait]
impl LlmProvider for SilentProvider {
    async fn chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<ChatReply, ProviderError> {
        Ok(ChatReply::default())
    }
    fn model_id(&self) -> &str {
        "test/silent"
    }
}

struct ApprovalInterface {
    approve: AtomicBool,
    asked: AtomicU32,
}

impl ApprovalInterface {
    fn new(approve: bool) -> Arc<Self> {
        Arc::new(Self {
            approve: AtomicBool::new(approve),
            asked: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Interface for ApprovalInterface {
    fn name(&self) -> &'static str {
        "approval"
    }
    async fn send(&self, _user_key: &str, _text: &str) -> bool {
        true
    }
    async fn ask_approval(&self, _user_key: &str, _question: &str) -> anyhow::Result<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.approve.load(Ordering::SeqCst))
    }
}

struct WipeTool {
    executions: Arc<AtomicU32>,
}

#[async_trait]
impl Tool for WipeTool {
    fn name(&self) -> &'static str {
        "wipe"
    }
    fn description(&self) -> &'static str {
        "Dangerous test tool."
    }
    fn parameters(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }
    fn risk(&self) -> RiskLevel {
        RiskLevel::Dangerous
    }
    async fn execute(&self, call: &ToolCall, _caller: &CallerInfo) -> anyhow::Result<ToolResult> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult::ok(&call.id, self.name(), "wiped"))
    }
}

struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &'static str {
        "broken"
    }
    fn description(&self) -> &'static str {
        "Always errors."
    }
    fn parameters(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }
    fn risk(&self) -> RiskLevel {
        RiskLevel::Safe
    }
    async fn execute(&self, _call: &ToolCall, _caller: &CallerInfo) -> anyhow::Result<ToolResult> {
        anyhow::bail!("kaput")
    }
}

struct VerboseTool;

#[async_trait]
impl Tool for VerboseTool {
    fn name(&self) -> &'static str {
        "verbose"
    }
    fn description(&self) -> &'static str {
        "Returns a very long result."
    }
    fn parameters(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }
    fn risk(&self) -> RiskLevel {
        RiskLevel::Safe
    }
    async fn execute(&self, call: &ToolCall, _caller: &CallerInfo) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::ok(&call.id, self.name(), "y".repeat(2000)))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    agent: Arc<Agent>,
    interface: Arc<ApprovalInterface>,
    journal: Arc<ActionJournal>,
    executions: Arc<AtomicU32>,
}

fn harness(level: AutonomyLevel, approve: bool) -> Harness {
    let interface = ApprovalInterface::new(approve);
    let journal = Arc::new(ActionJournal::new(50));
    let gate = Arc::new(AutonomyGate::new(level));
    gate.set_approval_transport(Arc::clone(&interface) as Arc<dyn Interface>);

    let executions = Arc::new(AtomicU32::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WipeTool {
        executions: Arc::clone(&executions),
    }));
    registry.register(Arc::new(BrokenTool));
    registry.register(Arc::new(VerboseTool));

    let agent = Arc::new(Agent::new(AgentDeps {
        llm: Arc::new(SilentProvider),
        tools: Arc::new(registry),
        gate,
        interface: Arc::clone(&interface) as Arc<dyn Interface>,
        journal: Arc::clone(&journal),
        monitor: Arc::new(AgentMonitor::new()),
        conversations: None,
        agent_name: "TestAgent".to_owned(),
        persona: "A test persona.".to_owned(),
        max_iterations: 25,
    }));

    Harness {
        agent,
        interface,
        journal,
        executions,
    }
}

fn call(name: &str) -> ToolCall {
    ToolCall {
        id: "call-1".to_owned(),
        name: name.to_owned(),
        arguments: serde_json::Map::new(),
    }
}

fn alice() -> CallerInfo {
    CallerInfo::new("alice", "test")
}

fn journal_kinds(journal: &ActionJournal) -> Vec<EventKind> {
    journal
        .for_user("alice", 50)
        .into_iter()
        .map(|e| e.kind)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_tool_lists_available_names() {
    let h = harness(AutonomyLevel::Autonomous, true);

    let result = h.agent.execute_tool(&call("nope"), &alice(), false).await;

    assert!(!result.success);
    assert!(result.content.contains("not found"));
    assert!(result.content.contains("wipe"), "lists names: {}", result.content);
    assert_eq!(journal_kinds(&h.journal), vec![EventKind::ToolFail]);
    assert_eq!(h.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejection_invites_a_different_approach() {
    let h = harness(AutonomyLevel::Paranoid, false);

    let result = h.agent.execute_tool(&call("wipe"), &alice(), false).await;

    assert!(!result.success);
    assert!(result.content.contains("Try a different approach"));
    assert_eq!(h.interface.asked.load(Ordering::SeqCst), 1);
    assert_eq!(h.executions.load(Ordering::SeqCst), 0, "no side effect on rejection");
    assert_eq!(journal_kinds(&h.journal), vec![EventKind::ToolFail]);
}

#[tokio::test]
async fn approval_accepted_executes_the_tool() {
    let h = harness(AutonomyLevel::Paranoid, true);

    let result = h.agent.execute_tool(&call("wipe"), &alice(), false).await;

    assert!(result.success);
    assert!(result.content.starts_with("[ok] "));
    assert_eq!(h.interface.asked.load(Ordering::SeqCst), 1);
    assert_eq!(h.executions.load(Ordering::SeqCst), 1);
    assert_eq!(journal_kinds(&h.journal), vec![EventKind::ToolOk]);
}

#[tokio::test]
async fn skip_approval_bypasses_the_gate() {
    let h = harness(AutonomyLevel::Paranoid, false);

    let result = h.agent.execute_tool(&call("wipe"), &alice(), true).await;

    assert!(result.success);
    assert_eq!(h.interface.asked.load(Ordering::SeqCst), 0, "gate must not be consulted");
    assert_eq!(h.executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tool_error_becomes_failed_result() {
    let h = harness(AutonomyLevel::Autonomous, true);

    let result = h.agent.execute_tool(&call("broken"), &alice(), false).await;

    assert!(!result.success);
    assert!(result.content.starts_with("[failed] "));
    assert!(result.content.contains("kaput"));
    assert_eq!(journal_kinds(&h.journal), vec![EventKind::ToolFail]);
}

#[tokio::test]
async fn journaled_detail_is_truncated() {
    let h = harness(AutonomyLevel::Autonomous, true);

    let result = h.agent.execute_tool(&call("verbose"), &alice(), false).await;
    assert!(result.success);
    assert!(result.content.len() > 1000, "result itself is not truncated");

    let entries = h.journal.for_user("alice", 50);
    let details = entries[0].details.as_deref().expect("details recorded");
    assert!(
        details.chars().count() <= 503,
        "journal detail must be capped, got {}",
        details.chars().count()
    );
}

#[tokio::test]
async fn safe_tools_skip_approval_under_careful() {
    let h = harness(AutonomyLevel::Careful, false);

    let result = h.agent.execute_tool(&call("verbose"), &alice(), false).await;

    assert!(result.success);
    assert_eq!(h.interface.asked.load(Ordering::SeqCst), 0);
}
