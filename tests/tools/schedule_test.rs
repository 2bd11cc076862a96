//! Scheduler tool tests: schedule_task, list_tasks, cancel_task.

use std::sync::Arc;

use serde_json::json;

use straylight::db;
use straylight::scheduler::store::{ScheduleKind, TaskStatus, TaskStore};
use straylight::tools::schedule::{CancelTaskTool, ListTasksTool, ScheduleTaskTool};
use straylight::tools::Tool;
use straylight::types::{CallerInfo, ToolCall};

async fn make_store() -> Arc<TaskStore> {
    let pool = db::open_in_memory().await.expect("in-memory pool");
    let store = TaskStore::new(pool);
    store.init().await.expect("schema");
    Arc::new(store)
}

fn call(args: serde_json::Value) -> ToolCall {
    ToolCall {
        id: "call-1".to_owned(),
        name: "schedule_task".to_owned(),
        arguments: args.as_object().cloned().expect("object args"),
    }
}

fn alice() -> CallerInfo {
    CallerInfo::new("alice", "test")
}

// ---------- schedule_task ----------

#[tokio::test]
async fn creates_an_interval_task() {
    let store = make_store().await;
    let tool = ScheduleTaskTool::new(Arc::clone(&store));

    let result = tool
        .execute(
            &call(json!({
                "tool_name": "echo",
                "args": {"text": "ping"},
                "schedule_type": "every_n",
                "interval_seconds": 300,
            })),
            &alice(),
        )
        .await
        .expect("execute");

    assert!(result.success, "got: {}", result.content);
    assert!(result.content.contains("Task created"));

    let tasks = store.list_tasks(Some("alice"), true).await.expect("list");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].schedule_kind, ScheduleKind::EveryN);
    assert_eq!(tasks[0].interval_seconds, Some(300));
    assert_eq!(tasks[0].status, TaskStatus::Active);
    assert_eq!(tasks[0].args.get("text").and_then(|v| v.as_str()), Some("ping"));
}

#[tokio::test]
async fn one_time_delay_defaults_to_utc() {
    let store = make_store().await;
    let tool = ScheduleTaskTool::new(Arc::clone(&store));

    let result = tool
        .execute(
            &call(json!({
                "tool_name": "echo",
                "schedule_type": "one_time",
                "delay_seconds": 60,
            })),
            &alice(),
        )
        .await
        .expect("execute");

    assert!(result.success, "got: {}", result.content);
    let tasks = store.list_tasks(Some("alice"), true).await.expect("list");
    assert_eq!(tasks[0].timezone, "UTC");
}

#[tokio::test]
async fn calendar_schedules_require_a_timezone() {
    let store = make_store().await;
    let tool = ScheduleTaskTool::new(store);

    let result = tool
        .execute(
            &call(json!({
                "tool_name": "echo",
                "schedule_type": "daily_at",
                "time_of_day": "09:00",
            })),
            &alice(),
        )
        .await
        .expect("execute");

    assert!(!result.success);
    assert!(result.content.contains("timezone"), "got: {}", result.content);
}

#[tokio::test]
async fn weekly_task_stores_the_weekday_mask() {
    let store = make_store().await;
    let tool = ScheduleTaskTool::new(Arc::clone(&store));

    let result = tool
        .execute(
            &call(json!({
                "tool_name": "echo",
                "schedule_type": "weekly_on",
                "time_of_day": "08:30",
                "weekdays": [0, 2, 4],
                "timezone": "Europe/Lisbon",
            })),
            &alice(),
        )
        .await
        .expect("execute");

    assert!(result.success, "got: {}", result.content);
    let tasks = store.list_tasks(Some("alice"), true).await.expect("list");
    assert_eq!(tasks[0].weekday_mask.as_deref(), Some("0,2,4"));
    assert_eq!(tasks[0].timezone, "Europe/Lisbon");
}

#[tokio::test]
async fn rejects_unknown_schedule_type() {
    let store = make_store().await;
    let tool = ScheduleTaskTool::new(store);

    let result = tool
        .execute(
            &call(json!({"tool_name": "echo", "schedule_type": "fortnightly"})),
            &alice(),
        )
        .await
        .expect("execute");

    assert!(!result.success);
    assert!(result.content.contains("unknown schedule_type"));
}

#[tokio::test]
async fn rejects_invalid_timezone() {
    let store = make_store().await;
    let tool = ScheduleTaskTool::new(store);

    let result = tool
        .execute(
            &call(json!({
                "tool_name": "echo",
                "schedule_type": "daily_at",
                "time_of_day": "09:00",
                "timezone": "Atlantis/Lost",
            })),
            &alice(),
        )
        .await
        .expect("execute");

    assert!(!result.success);
    assert!(result.content.contains("unknown timezone"));
}

#[tokio::test]
async fn rejects_missing_tool_name() {
    let store = make_store().await;
    let tool = ScheduleTaskTool::new(store);

    let result = tool
        .execute(&call(json!({"schedule_type": "every_n"})), &alice())
        .await
        .expect("execute");

    assert!(!result.success);
    assert!(result.content.contains("tool_name"));
}

#[tokio::test]
async fn rejects_uncomputable_first_trigger() {
    let store = make_store().await;
    let tool = ScheduleTaskTool::new(store);

    // every_n without a positive interval has no first trigger.
    let result = tool
        .execute(
            &call(json!({"tool_name": "echo", "schedule_type": "every_n"})),
            &alice(),
        )
        .await
        .expect("execute");

    assert!(!result.success);
    assert!(result.content.contains("first trigger"));
}

// ---------- list_tasks ----------

#[tokio::test]
async fn list_tasks_renders_tasks_or_empty_notice() {
    let store = make_store().await;
    let schedule = ScheduleTaskTool::new(Arc::clone(&store));
    let list = ListTasksTool::new(Arc::clone(&store));

    let empty = list
        .execute(&call(json!({})), &alice())
        .await
        .expect("execute");
    assert!(empty.success);
    assert!(empty.content.contains("No tasks."));

    schedule
        .execute(
            &call(json!({
                "tool_name": "echo",
                "schedule_type": "every_n",
                "interval_seconds": 60,
            })),
            &alice(),
        )
        .await
        .expect("execute");

    let listed = list
        .execute(&call(json!({})), &alice())
        .await
        .expect("execute");
    assert!(listed.content.contains("status=active"));
    assert!(listed.content.contains("type=every_n"));
    assert!(listed.content.contains("tool=echo"));
}

#[tokio::test]
async fn list_tasks_only_mine_excludes_other_users() {
    let store = make_store().await;
    let schedule = ScheduleTaskTool::new(Arc::clone(&store));
    let list = ListTasksTool::new(Arc::clone(&store));

    schedule
        .execute(
            &call(json!({
                "tool_name": "echo",
                "schedule_type": "every_n",
                "interval_seconds": 60,
            })),
            &CallerInfo::new("bob", "test"),
        )
        .await
        .expect("execute");

    let mine = list
        .execute(&call(json!({})), &alice())
        .await
        .expect("execute");
    assert!(mine.content.contains("No tasks."));

    let all = list
        .execute(&call(json!({"only_mine": false})), &alice())
        .await
        .expect("execute");
    assert!(all.content.contains("tool=echo"));
}

// ---------- cancel_task ----------

#[tokio::test]
async fn cancel_task_is_owner_scoped() {
    let store = make_store().await;
    let schedule = ScheduleTaskTool::new(Arc::clone(&store));
    let cancel = CancelTaskTool::new(Arc::clone(&store));

    schedule
        .execute(
            &call(json!({
                "tool_name": "echo",
                "schedule_type": "every_n",
                "interval_seconds": 60,
            })),
            &alice(),
        )
        .await
        .expect("execute");
    let task_id = store.list_tasks(Some("alice"), true).await.expect("list")[0].id;

    // Bob cannot cancel Alice's task.
    let denied = cancel
        .execute(
            &call(json!({"task_id": task_id})),
            &CallerInfo::new("bob", "test"),
        )
        .await
        .expect("execute");
    assert!(!denied.success);

    let ok = cancel
        .execute(&call(json!({"task_id": task_id})), &alice())
        .await
        .expect("execute");
    assert!(ok.success, "got: {}", ok.content);

    let task = store.get(task_id).await.expect("get").expect("exists");
    assert_eq!(task.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn cancel_task_requires_task_id() {
    let store = make_store().await;
    let cancel = CancelTaskTool::new(store);

    let result = cancel
        .execute(&call(json!({})), &alice())
        .await
        .expect("execute");
    assert!(!result.success);
    assert!(result.content.contains("task_id"));
}
