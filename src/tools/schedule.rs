//! Scheduler-facing tools: create, list, and cancel tasks.
//!
//! `schedule_task` is the only way tasks are created; it computes the
//! first trigger itself (the recurrence engine only advances existing
//! tasks) and stores the validated schedule fields.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;

use crate::scheduler::engine::{self, FirstRunSpec};
use crate::scheduler::store::{NewTask, ScheduleKind, TaskStore};
use crate::types::{CallerInfo, RiskLevel, ToolCall, ToolResult};

use super::{opt_bool, opt_i64, opt_str, require_str, Tool};

/// Maximum tasks rendered by `list_tasks`.
const LIST_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// schedule_task
// ---------------------------------------------------------------------------

/// Creates one-shot and recurring scheduled tasks.
pub struct ScheduleTaskTool {
    store: Arc<TaskStore>,
}

impl ScheduleTaskTool {
    /// Create the tool over the given store.
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ScheduleTaskTool {
    fn name(&self) -> &'static str {
        "schedule_task"
    }

    fn description(&self) -> &'static str {
        "Create a deferred or recurring task that runs another tool later. \
         Supports one_time, every_n, daily_at, weekly_on, and monthly_on schedules."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "tool_name": {"type": "string", "description": "Tool to run when the task triggers"},
                "args": {"type": "object", "description": "Arguments passed to the tool"},
                "schedule_type": {
                    "type": "string",
                    "enum": ["one_time", "every_n", "daily_at", "weekly_on", "monthly_on"],
                },
                "delay_seconds": {"type": "integer", "description": "one_time: run after N seconds"},
                "execute_at": {"type": "string", "description": "one_time: ISO timestamp to run at"},
                "interval_seconds": {"type": "integer", "description": "every_n: repeat interval"},
                "time_of_day": {"type": "string", "description": "HH:MM local time for daily/weekly/monthly"},
                "weekdays": {
                    "type": "array",
                    "items": {"type": "integer"},
                    "description": "weekly_on: weekday numbers 0..6, 0 = Monday",
                },
                "day_of_month": {"type": "integer", "description": "monthly_on: day 1..31"},
                "timezone": {"type": "string", "description": "IANA timezone, e.g. Europe/Lisbon"},
            },
            "required": ["tool_name", "schedule_type"],
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Dangerous
    }

    async fn execute(&self, call: &ToolCall, caller: &CallerInfo) -> anyhow::Result<ToolResult> {
        let tool_name = match require_str(call, "tool_name") {
            Ok(name) => name.to_owned(),
            Err(e) => return Ok(ToolResult::fail(&call.id, self.name(), e.to_string())),
        };

        let args = match call.arguments.get("args") {
            None => serde_json::Map::new(),
            Some(serde_json::Value::Object(map)) => map.clone(),
            Some(_) => {
                return Ok(ToolResult::fail(
                    &call.id,
                    self.name(),
                    "'args' must be a JSON object",
                ))
            }
        };

        let kind_str = match require_str(call, "schedule_type") {
            Ok(s) => s,
            Err(e) => return Ok(ToolResult::fail(&call.id, self.name(), e.to_string())),
        };
        let Some(kind) = ScheduleKind::parse(kind_str) else {
            return Ok(ToolResult::fail(
                &call.id,
                self.name(),
                format!(
                    "unknown schedule_type '{kind_str}'; expected one of \
                     one_time, every_n, daily_at, weekly_on, monthly_on"
                ),
            ));
        };

        let spec = FirstRunSpec {
            delay_seconds: opt_i64(call, "delay_seconds"),
            execute_at: opt_str(call, "execute_at").map(str::to_owned),
            interval_seconds: opt_i64(call, "interval_seconds"),
            time_of_day: opt_str(call, "time_of_day").map(str::to_owned),
            weekdays: weekday_list(call),
            day_of_month: opt_i64(call, "day_of_month").and_then(|d| u32::try_from(d).ok()),
        };

        let timezone = match resolve_timezone(call, kind, &spec) {
            Ok(tz) => tz,
            Err(message) => return Ok(ToolResult::fail(&call.id, self.name(), message)),
        };
        let tz: Tz = match timezone.parse() {
            Ok(tz) => tz,
            Err(_) => {
                return Ok(ToolResult::fail(
                    &call.id,
                    self.name(),
                    format!("unknown timezone '{timezone}'; use an IANA name like Europe/Lisbon"),
                ))
            }
        };

        let Some(first_run) = engine::first_run(kind, &spec, tz, Utc::now()) else {
            return Ok(ToolResult::fail(
                &call.id,
                self.name(),
                "could not compute the first trigger; check the schedule parameters",
            ));
        };

        let weekday_mask = if spec.weekdays.is_empty() {
            None
        } else {
            Some(
                spec.weekdays
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            )
        };

        let task_id = self
            .store
            .create(NewTask {
                user_key: caller.user_key.clone(),
                tool_name,
                args,
                schedule_kind: kind,
                interval_seconds: spec.interval_seconds,
                time_of_day: spec.time_of_day.clone(),
                weekday_mask,
                day_of_month: spec.day_of_month.map(i64::from),
                timezone,
                next_run_at_utc: first_run,
            })
            .await?;

        Ok(ToolResult::ok(
            &call.id,
            self.name(),
            format!(
                "Task created: id={task_id}, type={}, next={}",
                kind.as_str(),
                first_run.to_rfc3339()
            ),
        ))
    }
}

/// Extract a validated weekday list from the call arguments.
fn weekday_list(call: &ToolCall) -> Vec<u32> {
    call.arguments
        .get("weekdays")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_i64())
                .filter_map(|d| u32::try_from(d).ok())
                .filter(|d| *d <= 6)
                .collect()
        })
        .unwrap_or_default()
}

/// Resolve the timezone for a new task.
///
/// Calendar schedules need an explicit IANA zone; `one_time` with a
/// relative delay and `every_n` are timezone-independent and default to
/// UTC.
fn resolve_timezone(
    call: &ToolCall,
    kind: ScheduleKind,
    spec: &FirstRunSpec,
) -> Result<String, String> {
    if let Some(explicit) = opt_str(call, "timezone") {
        return Ok(explicit.to_owned());
    }
    let interval_like = matches!(kind, ScheduleKind::EveryN)
        || (kind == ScheduleKind::OneTime && spec.delay_seconds.is_some());
    if interval_like {
        return Ok("UTC".to_owned());
    }
    Err(
        "no timezone given; pass an IANA timezone (e.g. Europe/Lisbon) so local \
         times resolve correctly"
            .to_owned(),
    )
}

// ---------------------------------------------------------------------------
// list_tasks
// ---------------------------------------------------------------------------

/// Lists scheduled tasks.
pub struct ListTasksTool {
    store: Arc<TaskStore>,
}

impl ListTasksTool {
    /// Create the tool over the given store.
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListTasksTool {
    fn name(&self) -> &'static str {
        "list_tasks"
    }

    fn description(&self) -> &'static str {
        "List scheduler tasks (active ones by default)."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "only_mine": {"type": "boolean", "default": true},
                "include_done": {"type": "boolean", "default": false},
            },
            "required": [],
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Safe
    }

    async fn execute(&self, call: &ToolCall, caller: &CallerInfo) -> anyhow::Result<ToolResult> {
        let only_mine = opt_bool(call, "only_mine").unwrap_or(true);
        let include_done = opt_bool(call, "include_done").unwrap_or(false);
        let user_filter = only_mine.then_some(caller.user_key.as_str());

        let tasks = self.store.list_tasks(user_filter, include_done).await?;
        if tasks.is_empty() {
            return Ok(ToolResult::ok(&call.id, self.name(), "No tasks."));
        }

        let mut lines = vec!["Scheduler tasks:".to_owned()];
        for task in tasks.iter().take(LIST_LIMIT) {
            lines.push(format!(
                "- id={} status={} type={} next={} tool={} runs={}",
                task.id,
                task.status.as_str(),
                task.schedule_kind.as_str(),
                task.next_run_at_utc.to_rfc3339(),
                task.tool_name,
                task.run_count,
            ));
        }
        Ok(ToolResult::ok(&call.id, self.name(), lines.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// cancel_task
// ---------------------------------------------------------------------------

/// Cancels a scheduled task by id.
pub struct CancelTaskTool {
    store: Arc<TaskStore>,
}

impl CancelTaskTool {
    /// Create the tool over the given store.
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CancelTaskTool {
    fn name(&self) -> &'static str {
        "cancel_task"
    }

    fn description(&self) -> &'static str {
        "Cancel a scheduler task by id."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "integer"},
            },
            "required": ["task_id"],
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Moderate
    }

    async fn execute(&self, call: &ToolCall, caller: &CallerInfo) -> anyhow::Result<ToolResult> {
        let Some(task_id) = opt_i64(call, "task_id") else {
            return Ok(ToolResult::fail(
                &call.id,
                self.name(),
                "missing required argument 'task_id'",
            ));
        };

        let cancelled = self
            .store
            .cancel(task_id, Some(caller.user_key.as_str()))
            .await?;
        if cancelled {
            Ok(ToolResult::ok(
                &call.id,
                self.name(),
                format!("Task id={task_id} cancelled"),
            ))
        } else {
            Ok(ToolResult::fail(
                &call.id,
                self.name(),
                format!("Task id={task_id} not found or already inactive"),
            ))
        }
    }
}
