//! Console transport for local use without a chat platform.
//!
//! Reads lines from stdin. A line is either an answer to the pending
//! approval question (resolved through a one-shot channel) or a new user
//! message, which is handled on a spawned task so the input loop stays
//! responsive while a turn is in flight.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use super::{Interface, MessageHandler};
use crate::types::CallerInfo;

/// Default bounded wait for an approval answer.
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 300;

/// Fixed user key for the local console user.
const CONSOLE_USER_KEY: &str = "console";

/// Local stdin/stdout transport.
pub struct ConsoleInterface {
    agent_name: String,
    approval_timeout: Duration,
    /// Resolver for the approval question currently awaiting an answer.
    ///
    /// Resolved exactly once: either by the next `y`/`n` input line or by
    /// the timeout in [`ask_approval`](Interface::ask_approval).
    pending_approval: Mutex<Option<oneshot::Sender<bool>>>,
}

impl std::fmt::Debug for ConsoleInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleInterface")
            .field("agent_name", &self.agent_name)
            .finish_non_exhaustive()
    }
}

impl ConsoleInterface {
    /// Create a console transport that labels replies with `agent_name`.
    pub fn new(agent_name: impl Into<String>, approval_timeout: Duration) -> Self {
        Self {
            agent_name: agent_name.into(),
            approval_timeout,
            pending_approval: Mutex::new(None),
        }
    }

    /// Run the stdin loop until EOF, `/quit`, or the shutdown signal.
    pub async fn run(
        self: Arc<Self>,
        handler: Arc<dyn MessageHandler>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        println!("straylight console. Type a message; /quit to exit.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("console interface shutting down");
                        break;
                    }
                    continue;
                }
            };

            let text = match line {
                Ok(Some(raw)) => raw.trim().to_owned(),
                Ok(None) => {
                    info!("stdin closed, console interface exiting");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "failed to read stdin line");
                    break;
                }
            };

            if text.is_empty() {
                continue;
            }

            // An in-flight approval question consumes the next line.
            if let Some(resolver) = self.take_pending() {
                let approved = matches!(text.to_lowercase().as_str(), "y" | "yes");
                if resolver.send(approved).is_err() {
                    debug!("approval answer arrived after the wait expired");
                }
                continue;
            }

            if matches!(text.as_str(), "/quit" | "/exit" | "/q") {
                info!("console interface exiting on user request");
                break;
            }

            let caller = CallerInfo {
                user_key: CONSOLE_USER_KEY.to_owned(),
                name: Some("console user".to_owned()),
                source_type: "console".to_owned(),
                source_id: Some(CONSOLE_USER_KEY.to_owned()),
            };
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                handler.handle_message(text, caller).await;
            });
        }
    }

    fn take_pending(&self) -> Option<oneshot::Sender<bool>> {
        match self.pending_approval.lock() {
            Ok(mut slot) => slot.take(),
            Err(e) => {
                warn!(error = %e, "pending approval lock poisoned");
                None
            }
        }
    }

    fn set_pending(&self, sender: oneshot::Sender<bool>) {
        match self.pending_approval.lock() {
            Ok(mut slot) => {
                if slot.replace(sender).is_some() {
                    // Replacing drops the old sender; its waiter sees a
                    // closed channel and treats it as rejection.
                    warn!("replacing an unanswered approval question");
                }
            }
            Err(e) => warn!(error = %e, "pending approval lock poisoned"),
        }
    }
}

#[async_trait]
impl Interface for ConsoleInterface {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn send(&self, _user_key: &str, text: &str) -> bool {
        println!("\n[{}] {text}\n", self.agent_name);
        true
    }

    async fn ask_approval(&self, _user_key: &str, question: &str) -> anyhow::Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.set_pending(tx);

        println!("\n{question}\n(y/n): ");

        match tokio::time::timeout(self.approval_timeout, rx).await {
            Ok(Ok(approved)) => Ok(approved),
            // Sender dropped (superseded question), treated as rejection.
            Ok(Err(_)) => Ok(false),
            // Timeout fails closed, unlike the gate's fail-open default
            // when no transport exists at all.
            Err(_) => {
                let _ = self.take_pending();
                info!("approval question timed out, treating as rejected");
                Ok(false)
            }
        }
    }
}
