//! Durable store for scheduled tasks and their run history.
//!
//! Two tables: `scheduled_tasks` holds one row per task, mutated only by
//! [`TaskStore::complete_run`] and [`TaskStore::cancel`]; `task_runs` is
//! an append-only audit trail of execution attempts. Tasks are never
//! deleted. Timestamps are RFC 3339 UTC strings, which compare
//! lexicographically, so the due query is a plain string comparison over
//! the `(status, next_run_at_utc)` index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::warn;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Task store operation errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("scheduler database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Stored JSON could not be encoded or decoded.
    #[error("scheduler serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Schedule descriptor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Run once, then terminal.
    OneTime,
    /// Run every `interval_seconds`.
    EveryN,
    /// Run daily at a local time of day.
    DailyAt,
    /// Run on selected weekdays at a local time of day.
    WeeklyOn,
    /// Run on a day of the month at a local time of day.
    MonthlyOn,
}

impl ScheduleKind {
    /// String form stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneTime => "one_time",
            Self::EveryN => "every_n",
            Self::DailyAt => "daily_at",
            Self::WeeklyOn => "weekly_on",
            Self::MonthlyOn => "monthly_on",
        }
    }

    /// Parse from a stored or user-supplied string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "one_time" => Some(Self::OneTime),
            "every_n" => Some(Self::EveryN),
            "daily_at" => Some(Self::DailyAt),
            "weekly_on" => Some(Self::WeeklyOn),
            "monthly_on" => Some(Self::MonthlyOn),
            _ => None,
        }
    }
}

/// Lifecycle status of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Eligible for execution when due.
    Active,
    /// One-time task that completed successfully.
    Done,
    /// Cancelled by the user.
    Cancelled,
    /// One-time task whose single run failed.
    Failed,
}

impl TaskStatus {
    /// String form stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Parse from a stored string; unknown values map to `Failed`.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "done" => Self::Done,
            "cancelled" => Self::Cancelled,
            _ => Self::Failed,
        }
    }
}

/// A scheduled task row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    /// Row id.
    pub id: i64,
    /// Owning user key.
    pub user_key: String,
    /// Tool to invoke when due.
    pub tool_name: String,
    /// Tool arguments.
    pub args: serde_json::Map<String, serde_json::Value>,
    /// Schedule descriptor type.
    pub schedule_kind: ScheduleKind,
    /// Interval for `every_n`.
    pub interval_seconds: Option<i64>,
    /// `HH:MM` local time for calendar schedules.
    pub time_of_day: Option<String>,
    /// Comma-separated weekday numbers (0 = Monday) for `weekly_on`.
    pub weekday_mask: Option<String>,
    /// Day of month for `monthly_on`.
    pub day_of_month: Option<i64>,
    /// IANA timezone the calendar fields are evaluated in.
    pub timezone: String,
    /// Next trigger instant, UTC.
    pub next_run_at_utc: DateTime<Utc>,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Last update timestamp (RFC 3339).
    pub updated_at: String,
    /// Error from the most recent failed run.
    pub last_error: Option<String>,
    /// Number of completed run attempts.
    pub run_count: i64,
}

/// Fields required to create a task.
///
/// `next_run_at_utc` is the caller-computed first trigger; the recurrence
/// engine only computes subsequent triggers.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Owning user key.
    pub user_key: String,
    /// Tool to invoke when due.
    pub tool_name: String,
    /// Tool arguments.
    pub args: serde_json::Map<String, serde_json::Value>,
    /// Schedule descriptor type.
    pub schedule_kind: ScheduleKind,
    /// Interval for `every_n`.
    pub interval_seconds: Option<i64>,
    /// `HH:MM` local time for calendar schedules.
    pub time_of_day: Option<String>,
    /// Comma-separated weekday numbers for `weekly_on`.
    pub weekday_mask: Option<String>,
    /// Day of month for `monthly_on`.
    pub day_of_month: Option<i64>,
    /// IANA timezone name.
    pub timezone: String,
    /// First trigger instant, UTC.
    pub next_run_at_utc: DateTime<Utc>,
}

/// One recorded execution attempt (audit only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRun {
    /// Row id.
    pub id: i64,
    /// Task this run belongs to.
    pub task_id: i64,
    /// When the attempt started (RFC 3339).
    pub started_at: String,
    /// When the attempt finished (RFC 3339).
    pub finished_at: String,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Error text for failed attempts.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS scheduled_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_key TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    args_json TEXT NOT NULL,
    schedule_kind TEXT NOT NULL,
    interval_seconds INTEGER,
    time_of_day TEXT,
    weekday_mask TEXT,
    day_of_month INTEGER,
    timezone TEXT NOT NULL DEFAULT 'UTC',
    next_run_at_utc TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_error TEXT,
    run_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_scheduled_tasks_due
ON scheduled_tasks(status, next_run_at_utc);

CREATE TABLE IF NOT EXISTS task_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    success INTEGER NOT NULL,
    error TEXT,
    FOREIGN KEY (task_id) REFERENCES scheduled_tasks(id)
);
";

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// SQLite-backed scheduler persistence.
///
/// The store is the sole owner of scheduled-task durable state. Reads go
/// through the shared pool; the run-completion transition runs in a
/// single transaction so a crash can never record a run without updating
/// the task, or vice versa.
#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore").finish_non_exhaustive()
    }
}

impl TaskStore {
    /// Wrap an open pool. Call [`TaskStore::init`] before first use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if schema creation fails.
    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a new task with status `active`, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database or serialization failure.
    pub async fn create(&self, task: NewTask) -> Result<i64, StoreError> {
        let now = Utc::now().to_rfc3339();
        let args_json = serde_json::to_string(&task.args)?;

        let result = sqlx::query(
            "INSERT INTO scheduled_tasks (
                user_key, tool_name, args_json, schedule_kind,
                interval_seconds, time_of_day, weekday_mask, day_of_month,
                timezone, next_run_at_utc, status, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'active', ?11, ?12)",
        )
        .bind(&task.user_key)
        .bind(&task.tool_name)
        .bind(&args_json)
        .bind(task.schedule_kind.as_str())
        .bind(task.interval_seconds)
        .bind(&task.time_of_day)
        .bind(&task.weekday_mask)
        .bind(task.day_of_month)
        .bind(&task.timezone)
        .bind(task.next_run_at_utc.to_rfc3339())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Fetch active tasks whose trigger has passed, soonest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn fetch_due(&self, limit: usize) -> Result<Vec<ScheduledTask>, StoreError> {
        let now = Utc::now().to_rfc3339();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            "SELECT * FROM scheduled_tasks
             WHERE status = 'active' AND next_run_at_utc <= ?1
             ORDER BY next_run_at_utc ASC
             LIMIT ?2",
        )
        .bind(&now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    /// List tasks, optionally restricted to one user and to active-only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn list_tasks(
        &self,
        user_key: Option<&str>,
        include_done: bool,
    ) -> Result<Vec<ScheduledTask>, StoreError> {
        let mut clauses: Vec<&str> = Vec::new();
        if user_key.is_some() {
            clauses.push("user_key = ?1");
        }
        if !include_done {
            clauses.push("status = 'active'");
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT * FROM scheduled_tasks {where_clause} ORDER BY next_run_at_utc ASC"
        );

        let mut query = sqlx::query(&sql);
        if let Some(key) = user_key {
            query = query.bind(key.to_owned());
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter().map(row_to_task).collect()
    }

    /// Load a single task by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn get(&self, id: i64) -> Result<Option<ScheduledTask>, StoreError> {
        let row = sqlx::query("SELECT * FROM scheduled_tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    /// Record one execution attempt and advance the task, atomically.
    ///
    /// Appends a `task_runs` row and updates the task in one transaction:
    /// `next_run_at_utc` is replaced only when `next_run` is provided,
    /// `run_count` is incremented, `last_error` is set, and status
    /// transitions: a one-time task with no `next_run` becomes `done` on
    /// success or `failed` on failure; a recurring task stays `active`
    /// regardless, so a failed run simply retries at its next trigger.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on transaction failure.
    pub async fn complete_run(
        &self,
        task: &ScheduledTask,
        success: bool,
        next_run: Option<DateTime<Utc>>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let finished_at = Utc::now().to_rfc3339();
        let terminal = task.schedule_kind == ScheduleKind::OneTime && next_run.is_none();
        let status = if terminal {
            if success {
                TaskStatus::Done
            } else {
                TaskStatus::Failed
            }
        } else {
            TaskStatus::Active
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO task_runs (task_id, started_at, finished_at, success, error)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(task.id)
        .bind(&finished_at)
        .bind(&finished_at)
        .bind(success)
        .bind(error)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE scheduled_tasks
             SET next_run_at_utc = COALESCE(?1, next_run_at_utc),
                 status = ?2,
                 updated_at = ?3,
                 last_error = ?4,
                 run_count = run_count + 1
             WHERE id = ?5",
        )
        .bind(next_run.map(|dt| dt.to_rfc3339()))
        .bind(status.as_str())
        .bind(&finished_at)
        .bind(error)
        .bind(task.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Cancel an active task.
    ///
    /// Returns `false` when the task does not exist, is already
    /// non-active, or is owned by a different user when `user_key` is
    /// given.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on update failure.
    pub async fn cancel(&self, id: i64, user_key: Option<&str>) -> Result<bool, StoreError> {
        let now = Utc::now().to_rfc3339();
        let result = if let Some(key) = user_key {
            sqlx::query(
                "UPDATE scheduled_tasks
                 SET status = 'cancelled', updated_at = ?1
                 WHERE id = ?2 AND status = 'active' AND user_key = ?3",
            )
            .bind(&now)
            .bind(id)
            .bind(key)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE scheduled_tasks
                 SET status = 'cancelled', updated_at = ?1
                 WHERE id = ?2 AND status = 'active'",
            )
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?
        };

        Ok(result.rows_affected() > 0)
    }

    /// Run history for a task, oldest first (audit queries and tests).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn runs_for(&self, task_id: i64) -> Result<Vec<TaskRun>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, task_id, started_at, finished_at, success, error
             FROM task_runs WHERE task_id = ?1 ORDER BY id ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TaskRun {
                    id: row.try_get("id")?,
                    task_id: row.try_get("task_id")?,
                    started_at: row.try_get("started_at")?,
                    finished_at: row.try_get("finished_at")?,
                    success: row.try_get("success")?,
                    error: row.try_get("error")?,
                })
            })
            .collect()
    }
}

/// Decode one `scheduled_tasks` row.
fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<ScheduledTask, StoreError> {
    let args_json: String = row.try_get("args_json")?;
    let args = match serde_json::from_str::<serde_json::Value>(&args_json) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            warn!(args = %args_json, "stored task args are not a JSON object, using empty");
            serde_json::Map::new()
        }
    };

    let kind_str: String = row.try_get("schedule_kind")?;
    let schedule_kind = ScheduleKind::parse(&kind_str).unwrap_or(ScheduleKind::OneTime);

    let status_str: String = row.try_get("status")?;
    let next_run_str: String = row.try_get("next_run_at_utc")?;

    Ok(ScheduledTask {
        id: row.try_get("id")?,
        user_key: row.try_get("user_key")?,
        tool_name: row.try_get("tool_name")?,
        args,
        schedule_kind,
        interval_seconds: row.try_get("interval_seconds")?,
        time_of_day: row.try_get("time_of_day")?,
        weekday_mask: row.try_get("weekday_mask")?,
        day_of_month: row.try_get("day_of_month")?,
        timezone: row.try_get("timezone")?,
        next_run_at_utc: parse_rfc3339_or_now(&next_run_str),
        status: TaskStatus::parse(&status_str),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_error: row.try_get("last_error")?,
        run_count: row.try_get("run_count")?,
    })
}

/// Parse an RFC 3339 timestamp, falling back to now on corruption.
fn parse_rfc3339_or_now(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
