//! Front-end transport abstraction.
//!
//! A transport delivers outbound replies and asks the user yes/no approval
//! questions. Both operations must be non-blocking with respect to other
//! users: an approval wait for one user never stalls another user's turn
//! or the scheduler tick.
//!
//! One transport ships with the binary: [`console::ConsoleInterface`] for
//! local use. Chat-bot transports plug in behind the same trait.

pub mod console;

use async_trait::async_trait;

use crate::types::CallerInfo;

/// Inbound message sink implemented by the agent.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one inbound user message to completion.
    async fn handle_message(&self, text: String, caller: CallerInfo);
}

/// A user-facing transport.
#[async_trait]
pub trait Interface: Send + Sync {
    /// Transport name used in logs and caller identities.
    fn name(&self) -> &'static str;

    /// Deliver `text` to the user. Returns whether delivery succeeded.
    async fn send(&self, user_key: &str, text: &str) -> bool;

    /// Ask the user a yes/no approval question.
    ///
    /// Implementations wait with a bounded timeout and resolve the answer
    /// at most once; an expired wait resolves to `false` (rejection).
    ///
    /// # Errors
    ///
    /// Returns an error only when the question could not be delivered at
    /// all; the caller treats that as an approval-channel failure, which
    /// is distinct from a rejection.
    async fn ask_approval(&self, user_key: &str, question: &str) -> anyhow::Result<bool>;
}
