//! Self-perception journal: a bounded ring of operational events.
//!
//! The agent and the scheduler record deliveries, tool outcomes, and
//! errors here. Before each reasoning iteration the loop asks for a
//! per-user digest of unseen failures and injects it into the context as
//! a system message, so the model can react to what actually happened.
//!
//! The buffer is an explicit fixed-capacity circular arena, so nothing here
//! ever grows without bound, and nothing is persisted to disk.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default ring capacity.
pub const DEFAULT_CAPACITY: usize = 200;

/// Detail truncation applied when rendering a digest line.
const DIGEST_DETAIL_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Kind of operational event recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An outbound message reached the user.
    DeliveryOk,
    /// An outbound message could not be delivered.
    DeliveryFail,
    /// A tool invocation succeeded.
    ToolOk,
    /// A tool invocation failed or was rejected.
    ToolFail,
    /// An internal error.
    Error,
    /// A non-fatal anomaly.
    Warning,
}

impl EventKind {
    /// Whether this kind qualifies for error queries and digest injection.
    pub fn is_attention(&self) -> bool {
        matches!(
            self,
            Self::Error | Self::Warning | Self::DeliveryFail | Self::ToolFail
        )
    }

    /// Uppercase tag used in rendered digests.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::DeliveryOk => "DELIVERY_OK",
            Self::DeliveryFail => "DELIVERY_FAIL",
            Self::ToolOk => "TOOL_OK",
            Self::ToolFail => "TOOL_FAIL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
        }
    }
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Event kind.
    pub kind: EventKind,
    /// Short human-readable summary.
    pub summary: String,
    /// Optional longer detail (already truncated by the recorder).
    pub details: Option<String>,
    /// Owning user key; `None` means the event is global.
    pub user_key: Option<String>,
}

impl JournalEntry {
    /// Build an entry timestamped now.
    pub fn new(kind: EventKind, summary: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            summary: summary.into(),
            details: None,
            user_key: None,
        }
    }

    /// Attach detail text.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attach an owning user key.
    #[must_use]
    pub fn for_user(mut self, user_key: impl Into<String>) -> Self {
        self.user_key = Some(user_key.into());
        self
    }

    fn visible_to(&self, user_key: &str) -> bool {
        match &self.user_key {
            None => true,
            Some(owner) => owner == user_key,
        }
    }
}

// ---------------------------------------------------------------------------
// Ring buffer
// ---------------------------------------------------------------------------

/// Interior state guarded by one mutex; critical sections never await.
struct JournalState {
    /// Circular arena of at most `capacity` entries.
    arena: Vec<JournalEntry>,
    /// Index of the oldest entry once the arena is full.
    head: usize,
    /// Per-user watermark for one-time digest injection.
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl JournalState {
    /// Entries in insertion order, oldest first.
    ///
    /// `head` is non-zero only after the arena has wrapped, in which case
    /// the oldest entries start at `head`.
    fn iter_ordered(&self) -> impl Iterator<Item = &JournalEntry> {
        let (wrapped, recent) = self.arena.split_at(self.head);
        recent.iter().chain(wrapped.iter())
    }
}

/// Bounded in-memory journal of operational events.
///
/// Insertion-ordered; the oldest entry is silently evicted on overflow.
/// Shared across the agent loop and the scheduler; the sync [`Mutex`] is
/// safe because every critical section is short and never awaits.
pub struct ActionJournal {
    capacity: usize,
    state: Mutex<JournalState>,
}

impl std::fmt::Debug for ActionJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionJournal")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl ActionJournal {
    /// Create a journal with the given capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(JournalState {
                arena: Vec::with_capacity(capacity),
                head: 0,
                last_seen: HashMap::new(),
            }),
        }
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        match self.state.lock() {
            Ok(state) => state.arena.len(),
            Err(_) => 0,
        }
    }

    /// Whether the journal holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record an event, evicting the oldest entry when full.
    pub fn record(&self, entry: JournalEntry) {
        if entry.kind.is_attention() {
            warn!(kind = entry.kind.tag(), summary = %entry.summary, "journal event");
        }
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "journal lock poisoned in record");
                return;
            }
        };
        if state.arena.len() < self.capacity {
            state.arena.push(entry);
        } else {
            let head = state.head;
            state.arena[head] = entry;
            state.head = head
                .checked_add(1)
                .filter(|next| *next < self.capacity)
                .unwrap_or(0);
        }
    }

    /// Most recent attention events (errors, warnings, failed deliveries
    /// and tool calls), optionally only those after `since`.
    pub fn recent_errors(&self, since: Option<DateTime<Utc>>, limit: usize) -> Vec<JournalEntry> {
        self.collect_recent(limit, |e| {
            e.kind.is_attention() && since.map_or(true, |cutoff| e.timestamp > cutoff)
        })
    }

    /// Most recent events owned by `user_key` or global.
    pub fn for_user(&self, user_key: &str, limit: usize) -> Vec<JournalEntry> {
        self.collect_recent(limit, |e| e.visible_to(user_key))
    }

    /// Render the unseen attention events for `user_key` as a context block.
    ///
    /// Returns `None` when no qualifying event is newer than the user's
    /// watermark. On a non-`None` return the watermark advances to now, so
    /// each qualifying event is injected at most once per user.
    pub fn digest_for_injection(&self, user_key: &str) -> Option<String> {
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "journal lock poisoned in digest_for_injection");
                return None;
            }
        };

        let last_seen = state
            .last_seen
            .get(user_key)
            .copied()
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let fresh: Vec<JournalEntry> = state
            .iter_ordered()
            .filter(|e| e.timestamp > last_seen && e.kind.is_attention() && e.visible_to(user_key))
            .cloned()
            .collect();

        if fresh.is_empty() {
            return None;
        }

        state.last_seen.insert(user_key.to_owned(), Utc::now());
        drop(state);

        Some(render_digest(&fresh))
    }

    fn collect_recent(
        &self,
        limit: usize,
        keep: impl Fn(&JournalEntry) -> bool,
    ) -> Vec<JournalEntry> {
        let state = match self.state.lock() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "journal lock poisoned in read");
                return Vec::new();
            }
        };
        let matching: Vec<JournalEntry> = state.iter_ordered().filter(|e| keep(e)).cloned().collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).collect()
    }
}

impl Default for ActionJournal {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Render a digest block from qualifying entries (oldest first).
fn render_digest(entries: &[JournalEntry]) -> String {
    let mut lines = vec![
        "[OPERATIONAL STATUS]".to_owned(),
        "The following events occurred since your last look and need your attention:".to_owned(),
    ];

    for entry in entries {
        let time = entry.timestamp.format("%H:%M:%S");
        lines.push(format!("- [{} {time}] {}", entry.kind.tag(), entry.summary));
        if let Some(details) = &entry.details {
            if matches!(entry.kind, EventKind::Error | EventKind::ToolFail) {
                lines.push(format!("  Details: {}", truncate_chars(details, DIGEST_DETAIL_CHARS)));
            }
        }
    }

    lines.push(String::new());
    lines.push(
        "Take this into account when replying. If an action failed, say so and \
         suggest an alternative."
            .to_owned(),
    );
    lines.join("\n")
}

/// Truncate to at most `max` characters, appending an ellipsis when cut.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}
