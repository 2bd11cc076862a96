//! The orchestration loop: think, act, observe.
//!
//! [`Agent`] owns the per-user conversation buffers and drives the
//! reasoning cycle for each inbound message: inject the perception
//! digest, call the LLM, dispatch any requested tool calls through the
//! autonomy gate, feed the results back, and repeat until the model
//! produces a reply or the iteration limit is hit.
//!
//! Tool calls within a turn run sequentially, in the order the model
//! issued them, since later calls in a batch may depend on the side effects
//! of earlier ones. A turn for one user never blocks a turn for another:
//! each user's buffer has its own async mutex.

pub mod autonomy;
pub mod context;
pub mod journal;
pub mod monitor;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::interfaces::{Interface, MessageHandler};
use crate::memory::ConversationStore;
use crate::providers::LlmProvider;
use crate::scheduler::run::ScheduledTaskRunner;
use crate::scheduler::store::ScheduledTask;
use crate::tools::ToolRegistry;
use crate::types::{AutonomyLevel, CallerInfo, Message, ToolCall, ToolResult};

use self::autonomy::AutonomyGate;
use self::context::PromptContext;
use self::journal::{truncate_chars, ActionJournal, EventKind, JournalEntry};
use self::monitor::AgentMonitor;

/// Default bound on reasoning iterations per turn.
pub const DEFAULT_MAX_ITERATIONS: u32 = 25;

/// Detail truncation applied to journaled tool outcomes.
const TOOL_DETAIL_CHARS: usize = 500;

/// One user's conversation buffer behind its own lock.
type Buffer = Arc<Mutex<Vec<Message>>>;

/// Shared resources needed by the agent.
///
/// Bundled into a single struct to avoid long parameter lists.
pub struct AgentDeps {
    /// LLM collaborator.
    pub llm: Arc<dyn LlmProvider>,
    /// Registered tools.
    pub tools: Arc<ToolRegistry>,
    /// Approval policy.
    pub gate: Arc<AutonomyGate>,
    /// Outbound transport.
    pub interface: Arc<dyn Interface>,
    /// Self-perception journal.
    pub journal: Arc<ActionJournal>,
    /// Runtime metrics.
    pub monitor: Arc<AgentMonitor>,
    /// Optional conversation persistence.
    pub conversations: Option<Arc<ConversationStore>>,
    /// Agent display name.
    pub agent_name: String,
    /// Persona text for the system prompt.
    pub persona: String,
    /// Bound on reasoning iterations per turn.
    pub max_iterations: u32,
}

/// The orchestration loop.
pub struct Agent {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    gate: Arc<AutonomyGate>,
    interface: Arc<dyn Interface>,
    journal: Arc<ActionJournal>,
    monitor: Arc<AgentMonitor>,
    conversations: Option<Arc<ConversationStore>>,
    agent_name: String,
    persona: String,
    max_iterations: u32,
    buffers: Mutex<HashMap<String, Buffer>>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("agent_name", &self.agent_name)
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Create the agent from its dependencies.
    pub fn new(deps: AgentDeps) -> Self {
        Self {
            llm: deps.llm,
            tools: deps.tools,
            gate: deps.gate,
            interface: deps.interface,
            journal: deps.journal,
            monitor: deps.monitor,
            conversations: deps.conversations,
            agent_name: deps.agent_name,
            persona: deps.persona,
            max_iterations: deps.max_iterations.max(1),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Render the runtime status report.
    pub async fn status_report(&self) -> String {
        let active = self.buffers.lock().await.len();
        let report = self.monitor.build_report(active);
        format!(
            "{report}\n- Autonomy: {}\n- Tools ({}): {}",
            self.gate.level().name(),
            self.tools.len(),
            self.tools.names().join(", "),
        )
    }

    /// Get or create the buffer for a user, seeding it from persisted
    /// history on first contact after a restart.
    async fn buffer_for(&self, user_key: &str) -> Buffer {
        if let Some(buffer) = self.buffers.lock().await.get(user_key) {
            return Arc::clone(buffer);
        }

        // Load outside the map lock; a concurrent first message for the
        // same user just wins the insert race below.
        let seed = match &self.conversations {
            Some(store) => match store.load_recent(user_key, crate::memory::DEFAULT_LOAD_LIMIT).await
            {
                Ok(messages) => {
                    if !messages.is_empty() {
                        debug!(user_key, count = messages.len(), "seeded buffer from history");
                    }
                    messages
                }
                Err(e) => {
                    warn!(user_key, error = %e, "failed to load conversation history");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut buffers = self.buffers.lock().await;
        Arc::clone(
            buffers
                .entry(user_key.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(seed))),
        )
    }

    /// Best-effort persistence of one message.
    async fn persist(&self, user_key: &str, message: &Message) {
        if let Some(store) = &self.conversations {
            if let Err(e) = store.save(user_key, message).await {
                warn!(user_key, error = %e, "failed to persist conversation message");
            }
        }
    }

    /// Handle local slash commands; returns `true` when consumed.
    async fn handle_command(&self, text: &str, caller: &CallerInfo) -> bool {
        if text == "/status" {
            let report = self.status_report().await;
            self.interface.send(&caller.user_key, &report).await;
            return true;
        }
        if let Some(raw) = text.strip_prefix("/autonomy ") {
            match raw.trim().parse::<u8>().ok().and_then(AutonomyLevel::from_repr) {
                Some(level) => {
                    self.gate.set_level(level);
                    self.interface
                        .send(
                            &caller.user_key,
                            &format!("Autonomy level set to {} ({})", level as u8, level.name()),
                        )
                        .await;
                }
                None => {
                    self.interface
                        .send(&caller.user_key, "Usage: /autonomy <0-3>")
                        .await;
                }
            }
            return true;
        }
        false
    }

    /// Process one inbound message through the reasoning loop.
    async fn process_message(&self, text: String, caller: CallerInfo) {
        info!(
            user_key = %caller.user_key,
            source = %caller.source_type,
            preview = %truncate_chars(&text, 100),
            "message received"
        );

        let buffer = self.buffer_for(&caller.user_key).await;
        // Holding the buffer lock for the whole turn serializes turns
        // per user; other users proceed on their own buffers.
        let mut conversation = buffer.lock().await;

        let user_message = Message::user(text);
        self.persist(&caller.user_key, &user_message).await;
        conversation.push(user_message);

        self.run_loop(&caller, &mut conversation).await;
    }

    /// The think-act-observe cycle for one turn.
    async fn run_loop(&self, caller: &CallerInfo, conversation: &mut Vec<Message>) {
        let tool_names = self.tools.names();
        let system_prompt = context::build_system_prompt(&PromptContext {
            agent_name: &self.agent_name,
            persona: &self.persona,
            tool_names: &tool_names,
            autonomy: self.gate.level(),
            caller,
            now: Utc::now(),
        });
        let schemas = self.tools.schemas();

        for iteration in 0..self.max_iterations {
            // Perception: surface unseen failures before thinking.
            if let Some(digest) = self.journal.digest_for_injection(&caller.user_key) {
                let message = Message::system(digest);
                self.persist(&caller.user_key, &message).await;
                conversation.push(message);
            }

            let messages = context::assemble_messages(&system_prompt, conversation);

            let reply = match self.llm.chat(&messages, &schemas).await {
                Ok(reply) => reply,
                Err(e) => {
                    // Turn-fatal: surfaced to the user, not retried.
                    self.monitor.record_error();
                    error!(iteration, error = %e, "LLM call failed");
                    self.interface
                        .send(
                            &caller.user_key,
                            &format!(
                                "LLM call failed: {e}\nTry again or check the configuration."
                            ),
                        )
                        .await;
                    return;
                }
            };
            self.monitor.record_llm_call(reply.usage);

            if reply.has_tool_calls() {
                let calls = reply.tool_calls.clone();
                let assistant = Message::assistant_with_calls(reply.text.clone(), calls.clone());
                self.persist(&caller.user_key, &assistant).await;
                conversation.push(assistant);

                // Sequential by contract: results must enter the buffer
                // in request order before the next LLM call.
                for call in &calls {
                    let result = self.execute_tool(call, caller, false).await;
                    let message = Message::tool(&result);
                    self.persist(&caller.user_key, &message).await;
                    conversation.push(message);
                }
                continue;
            }

            if let Some(text) = reply.text.filter(|t| !t.trim().is_empty()) {
                let assistant = Message::assistant(text.clone());
                self.persist(&caller.user_key, &assistant).await;
                conversation.push(assistant);

                let delivered = self.interface.send(&caller.user_key, &text).await;
                let entry = if delivered {
                    JournalEntry::new(
                        EventKind::DeliveryOk,
                        format!("Message delivered to user {}", caller.user_key),
                    )
                } else {
                    JournalEntry::new(
                        EventKind::DeliveryFail,
                        format!("FAILED to deliver message to user {}", caller.user_key),
                    )
                };
                self.journal.record(entry.for_user(&caller.user_key));
                return;
            }

            self.interface
                .send(&caller.user_key, "(empty reply from the model)")
                .await;
            return;
        }

        self.interface
            .send(
                &caller.user_key,
                &format!("[!] iteration limit reached ({})", self.max_iterations),
            )
            .await;
    }

    /// Resolve, gate, and execute one tool call.
    ///
    /// Never returns an error: unknown tools, rejections, and execution
    /// failures all become failed [`ToolResult`]s fed back to the model.
    /// Every outcome is journaled under the caller's user key.
    pub async fn execute_tool(
        &self,
        call: &ToolCall,
        caller: &CallerInfo,
        skip_approval: bool,
    ) -> ToolResult {
        let user_key = caller.user_key.as_str();

        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "unknown tool requested");
            let result = ToolResult::fail(
                &call.id,
                &call.name,
                format!(
                    "Tool '{}' not found. Available: {}",
                    call.name,
                    self.tools.names().join(", ")
                ),
            );
            self.record_tool_outcome(user_key, &call.name, &result);
            return result;
        };

        if !skip_approval {
            let approved = self.gate.request_approval(user_key, call, tool.risk()).await;
            if !approved {
                info!(tool = %call.name, "tool call rejected by user");
                // Deliberate prompt contract: steer the model toward an
                // alternative instead of a dead end.
                let result = ToolResult::fail(
                    &call.id,
                    &call.name,
                    "Action rejected by the user. Try a different approach.",
                );
                self.record_tool_outcome(user_key, &call.name, &result);
                return result;
            }
        }

        info!(tool = %call.name, user_key, "executing tool");
        let mut result = match tool.execute(call, caller).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool execution error");
                ToolResult::fail(&call.id, &call.name, format!("execution error: {e}"))
            }
        };

        // Prefix marker so transcripts are scannable without re-parsing
        // the success flag.
        let marker = if result.success { "[ok]" } else { "[failed]" };
        result.content = format!("{marker} {}", result.content);

        self.record_tool_outcome(user_key, &call.name, &result);
        if result.success {
            self.monitor.record_tool_call(&call.name);
        }
        debug!(
            tool = %call.name,
            success = result.success,
            len = result.content.len(),
            "tool finished"
        );
        result
    }

    fn record_tool_outcome(&self, user_key: &str, tool_name: &str, result: &ToolResult) {
        let kind = if result.success {
            EventKind::ToolOk
        } else {
            EventKind::ToolFail
        };
        let verdict = if result.success { "ok" } else { "failed" };
        self.journal.record(
            JournalEntry::new(kind, format!("Tool {tool_name}: {verdict}"))
                .with_details(truncate_chars(&result.content, TOOL_DETAIL_CHARS))
                .for_user(user_key),
        );
    }
}

#[async_trait]
impl MessageHandler for Agent {
    async fn handle_message(&self, text: String, caller: CallerInfo) {
        self.monitor.record_message();

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        if self.handle_command(trimmed, &caller).await {
            return;
        }

        self.process_message(trimmed.to_owned(), caller).await;
    }
}

#[async_trait]
impl ScheduledTaskRunner for Agent {
    /// Execute a due task through the same dispatch path as live
    /// conversation, with interactive approval bypassed; no user is
    /// present to answer.
    async fn run_scheduled_task(&self, task: &ScheduledTask) -> (bool, String) {
        let call = ToolCall {
            id: format!("sched-{}-{}", task.id, Utc::now().timestamp()),
            name: task.tool_name.clone(),
            arguments: task.args.clone(),
        };
        let caller = CallerInfo::scheduler(&task.user_key);
        let result = self.execute_tool(&call, &caller, true).await;
        (result.success, result.content)
    }
}
