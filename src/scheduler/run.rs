//! Background loop that executes due scheduled tasks.
//!
//! Ticks at a fixed interval, over-fetches due tasks so rate-limit skips
//! cannot starve later ticks, executes up to a batch through the same
//! dispatch path live conversation uses (approval bypassed; no user is
//! present to answer), advances each task via the recurrence engine, and
//! journals the outcome for the owning user's next turn.
//!
//! Tasks deferred by the rate limiter stay `active` and due, so they are
//! simply retried on a later tick. A failed tick is logged and skipped;
//! the loop itself never stops until shutdown.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::agent::journal::{ActionJournal, EventKind, JournalEntry};

use super::engine;
use super::store::{ScheduledTask, StoreError, TaskStore};

/// Detail truncation applied to journaled task outcomes.
const OUTCOME_DETAIL_CHARS: usize = 500;

/// Executes one scheduled task through the shared tool pipeline.
#[async_trait]
pub trait ScheduledTaskRunner: Send + Sync {
    /// Run the task's tool and return `(success, detail)`.
    async fn run_scheduled_task(&self, task: &ScheduledTask) -> (bool, String);
}

// ---------------------------------------------------------------------------
// Rate limiter
// ---------------------------------------------------------------------------

/// Rolling-window execution limiter shared across all users and tasks.
///
/// Sliding window over [`Instant`]s; the sync [`Mutex`] is fine because
/// the critical section never awaits.
#[derive(Debug)]
pub struct RateLimiter {
    window: Mutex<VecDeque<Instant>>,
    max_count: usize,
    window_secs: u64,
}

impl RateLimiter {
    /// Create a limiter allowing `max_count` events per `window_secs`.
    pub fn new(window_secs: u64, max_count: usize) -> Self {
        Self {
            window: Mutex::new(VecDeque::new()),
            max_count,
            window_secs,
        }
    }

    /// Whether another execution is currently allowed.
    pub fn check(&self) -> bool {
        let mut window = match self.window.lock() {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "rate limiter lock poisoned, denying");
                return false;
            }
        };

        let cutoff = Instant::now()
            .checked_sub(Duration::from_secs(self.window_secs))
            .unwrap_or_else(Instant::now);
        while window.front().is_some_and(|t| *t < cutoff) {
            window.pop_front();
        }

        window.len() < self.max_count
    }

    /// Record that an execution happened.
    pub fn record(&self) {
        if let Ok(mut window) = self.window.lock() {
            window.push_back(Instant::now());
        }
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Cooperative scheduler poller.
pub struct SchedulerLoop {
    store: Arc<TaskStore>,
    runner: Arc<dyn ScheduledTaskRunner>,
    journal: Arc<ActionJournal>,
    tick: Duration,
    batch_size: usize,
    limiter: RateLimiter,
}

impl std::fmt::Debug for SchedulerLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerLoop")
            .field("tick", &self.tick)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl SchedulerLoop {
    /// Create a scheduler loop.
    pub fn new(
        store: Arc<TaskStore>,
        runner: Arc<dyn ScheduledTaskRunner>,
        journal: Arc<ActionJournal>,
        tick: Duration,
        batch_size: usize,
        max_exec_per_minute: usize,
    ) -> Self {
        Self {
            store,
            runner,
            journal,
            tick,
            batch_size: batch_size.max(1),
            limiter: RateLimiter::new(60, max_exec_per_minute.max(1)),
        }
    }

    /// Run the poller until the shutdown signal fires.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(tick_secs = self.tick.as_secs_f64(), "scheduler loop started");
        let mut interval = tokio::time::interval(self.tick);
        // The first tick of a tokio interval fires immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick_once().await {
                        // A bad tick must never stop the poller.
                        error!(error = %e, "scheduler tick failed");
                    }
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("scheduler loop stopped");
    }

    /// Execute one tick: fetch due tasks and run up to a batch of them.
    ///
    /// Over-fetches three batches' worth so tasks skipped by the rate
    /// limiter do not hide later due tasks from the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails; remaining work is
    /// picked up on the next tick.
    pub async fn tick_once(&self) -> Result<(), StoreError> {
        let fetch_limit = self.batch_size.saturating_mul(3);
        let due = self.store.fetch_due(fetch_limit).await?;
        if due.is_empty() {
            return Ok(());
        }

        let mut executed: usize = 0;
        for task in due {
            if executed >= self.batch_size {
                break;
            }
            if !self.limiter.check() {
                debug!(remaining = self.batch_size.saturating_sub(executed),
                    "execution rate limit reached, deferring to next tick");
                break;
            }

            let (success, detail) = self.runner.run_scheduled_task(&task).await;
            let next_run = engine::next_run(&task);
            self.store
                .complete_run(&task, success, next_run, (!success).then_some(detail.as_str()))
                .await?;

            executed = executed.saturating_add(1);
            self.limiter.record();
            self.record_outcome(&task, success, &detail, next_run);
        }

        Ok(())
    }

    fn record_outcome(
        &self,
        task: &ScheduledTask,
        success: bool,
        detail: &str,
        next_run: Option<chrono::DateTime<chrono::Utc>>,
    ) {
        let kind = if success {
            EventKind::ToolOk
        } else {
            EventKind::ToolFail
        };
        let mut summary = if success {
            format!("Scheduled task #{} ran: {}", task.id, task.tool_name)
        } else {
            format!("Scheduled task #{} failed: {}", task.id, task.tool_name)
        };
        if let Some(next) = next_run {
            summary.push_str(&format!(" (next={})", next.to_rfc3339()));
        }

        let mut entry = JournalEntry::new(kind, summary).for_user(&task.user_key);
        if !detail.is_empty() {
            entry = entry.with_details(crate::agent::journal::truncate_chars(
                detail,
                OUTCOME_DETAIL_CHARS,
            ));
        }
        self.journal.record(entry);
    }
}
