//! Conversation store round-trip and retention tests.

use straylight::db;
use straylight::memory::ConversationStore;
use straylight::types::{Message, Role, ToolCall, ToolResult};

async fn make_store() -> ConversationStore {
    let pool = db::open_in_memory().await.expect("in-memory pool");
    let store = ConversationStore::new(pool);
    store.init().await.expect("schema");
    store
}

#[tokio::test]
async fn save_and_load_roundtrip_preserves_structure() {
    let store = make_store().await;

    let call = ToolCall {
        id: "c1".to_owned(),
        name: "echo".to_owned(),
        arguments: serde_json::json!({"text": "hi"}).as_object().cloned().expect("object"),
    };
    let result = ToolResult::ok("c1", "echo", "[ok] echo: hi");

    store.save("alice", &Message::user("hello")).await.expect("save");
    store
        .save("alice", &Message::assistant_with_calls(None, vec![call]))
        .await
        .expect("save");
    store.save("alice", &Message::tool(&result)).await.expect("save");
    store
        .save("alice", &Message::assistant("done"))
        .await
        .expect("save");

    let loaded = store.load_recent("alice", 50).await.expect("load");
    assert_eq!(loaded.len(), 4);
    assert_eq!(loaded[0].role, Role::User);
    assert_eq!(loaded[0].content.as_deref(), Some("hello"));

    let calls = loaded[1].tool_calls.as_ref().expect("tool calls survive");
    assert_eq!(calls[0].name, "echo");

    assert_eq!(loaded[2].role, Role::Tool);
    assert_eq!(loaded[2].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(loaded[2].name.as_deref(), Some("echo"));

    assert_eq!(loaded[3].content.as_deref(), Some("done"));
}

#[tokio::test]
async fn load_recent_returns_the_tail_in_order() {
    let store = make_store().await;
    for i in 0..10 {
        store
            .save("alice", &Message::user(format!("message {i}")))
            .await
            .expect("save");
    }

    let loaded = store.load_recent("alice", 3).await.expect("load");
    let contents: Vec<&str> = loaded
        .iter()
        .filter_map(|m| m.content.as_deref())
        .collect();
    assert_eq!(contents, vec!["message 7", "message 8", "message 9"]);
}

#[tokio::test]
async fn users_are_isolated() {
    let store = make_store().await;
    store.save("alice", &Message::user("from alice")).await.expect("save");
    store.save("bob", &Message::user("from bob")).await.expect("save");

    let alice = store.load_recent("alice", 10).await.expect("load");
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].content.as_deref(), Some("from alice"));

    assert_eq!(store.count("alice").await.expect("count"), 1);
    assert_eq!(store.count("carol").await.expect("count"), 0);
}

#[tokio::test]
async fn trim_keeps_only_the_most_recent() {
    let store = make_store().await;
    for i in 0..10 {
        store
            .save("alice", &Message::user(format!("message {i}")))
            .await
            .expect("save");
    }

    store.trim("alice", 4).await.expect("trim");

    assert_eq!(store.count("alice").await.expect("count"), 4);
    let loaded = store.load_recent("alice", 10).await.expect("load");
    assert_eq!(loaded[0].content.as_deref(), Some("message 6"));
}

#[tokio::test]
async fn empty_history_loads_empty() {
    let store = make_store().await;
    assert!(store.load_recent("nobody", 10).await.expect("load").is_empty());
}
