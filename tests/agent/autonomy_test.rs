//! Autonomy gate decision table and approval flow tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use straylight::agent::autonomy::{approval_required, format_approval_message, AutonomyGate};
use straylight::interfaces::Interface;
use straylight::types::{AutonomyLevel, RiskLevel, ToolCall};

fn call(name: &str) -> ToolCall {
    ToolCall {
        id: "call-1".to_owned(),
        name: name.to_owned(),
        arguments: serde_json::Map::new(),
    }
}

// ---------- decision table ----------

#[test]
fn decision_table_matches_spec() {
    use AutonomyLevel::{Autonomous, Balanced, Careful, Paranoid};
    use RiskLevel::{Dangerous, Moderate, Safe};

    let expectations = [
        (Paranoid, Safe, true),
        (Paranoid, Moderate, true),
        (Paranoid, Dangerous, true),
        (Careful, Safe, false),
        (Careful, Moderate, true),
        (Careful, Dangerous, true),
        (Balanced, Safe, false),
        (Balanced, Moderate, false),
        (Balanced, Dangerous, true),
        (Autonomous, Safe, false),
        (Autonomous, Moderate, false),
        (Autonomous, Dangerous, false),
    ];

    for (level, risk, expected) in expectations {
        assert_eq!(
            approval_required(level, risk),
            expected,
            "level={level:?} risk={risk:?}"
        );
    }
}

#[test]
fn gate_level_is_mutable_at_runtime() {
    let gate = AutonomyGate::new(AutonomyLevel::Paranoid);
    assert!(gate.needs_approval(RiskLevel::Safe));

    gate.set_level(AutonomyLevel::Autonomous);
    assert_eq!(gate.level(), AutonomyLevel::Autonomous);
    assert!(!gate.needs_approval(RiskLevel::Dangerous));
}

// ---------- approval flow ----------

struct ScriptedTransport {
    approve: bool,
    fail: bool,
    asked: AtomicU32,
    questions: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new(approve: bool) -> Self {
        Self {
            approve,
            fail: false,
            asked: AtomicU32::new(0),
            questions: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            approve: false,
            fail: true,
            asked: AtomicU32::new(0),
            questions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Interface for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn send(&self, _user_key: &str, _text: &str) -> bool {
        true
    }

    async fn ask_approval(&self, _user_key: &str, question: &str) -> anyhow::Result<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.questions.lock().expect("lock").push(question.to_owned());
        if self.fail {
            anyhow::bail!("channel broken");
        }
        Ok(self.approve)
    }
}

#[tokio::test]
async fn no_transport_fails_open() {
    let gate = AutonomyGate::new(AutonomyLevel::Paranoid);
    let approved = gate.request_approval("alice", &call("shell"), RiskLevel::Dangerous).await;
    assert!(approved, "missing transport must auto-approve");
}

#[tokio::test]
async fn transport_approval_is_respected() {
    let gate = AutonomyGate::new(AutonomyLevel::Paranoid);
    let transport = Arc::new(ScriptedTransport::new(true));
    gate.set_approval_transport(Arc::clone(&transport) as Arc<dyn Interface>);

    assert!(gate.request_approval("alice", &call("shell"), RiskLevel::Safe).await);
    assert_eq!(transport.asked.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transport_rejection_is_respected() {
    let gate = AutonomyGate::new(AutonomyLevel::Paranoid);
    let transport = Arc::new(ScriptedTransport::new(false));
    gate.set_approval_transport(Arc::clone(&transport) as Arc<dyn Interface>);

    assert!(!gate.request_approval("alice", &call("shell"), RiskLevel::Safe).await);
}

#[tokio::test]
async fn channel_failure_fails_open() {
    let gate = AutonomyGate::new(AutonomyLevel::Paranoid);
    let transport = Arc::new(ScriptedTransport::failing());
    gate.set_approval_transport(Arc::clone(&transport) as Arc<dyn Interface>);

    let approved = gate.request_approval("alice", &call("shell"), RiskLevel::Safe).await;
    assert!(approved, "approval channel failure must fail open");
}

#[tokio::test]
async fn auto_approved_calls_never_reach_the_transport() {
    let gate = AutonomyGate::new(AutonomyLevel::Autonomous);
    let transport = Arc::new(ScriptedTransport::new(false));
    gate.set_approval_transport(Arc::clone(&transport) as Arc<dyn Interface>);

    assert!(gate.request_approval("alice", &call("shell"), RiskLevel::Dangerous).await);
    assert_eq!(transport.asked.load(Ordering::SeqCst), 0);
}

// ---------- prompt rendering ----------

#[test]
fn approval_message_names_the_tool_and_risk() {
    let mut request = call("shell");
    request
        .arguments
        .insert("command".to_owned(), serde_json::json!("ls -la"));

    let message = format_approval_message(&request, RiskLevel::Dangerous);
    assert!(message.contains("shell"));
    assert!(message.contains("[!!!] dangerous"));
    assert!(message.contains("command="));
}

#[test]
fn approval_message_truncates_long_values_and_extra_args() {
    let mut request = call("shell");
    let long_value = "x".repeat(500);
    for i in 0..8 {
        request
            .arguments
            .insert(format!("arg{i}"), serde_json::json!(long_value.clone()));
    }

    let message = format_approval_message(&request, RiskLevel::Moderate);
    assert!(message.contains("+3 args"), "extra args should be elided: {message}");
    assert!(!message.contains(&long_value), "values should be truncated");
}
