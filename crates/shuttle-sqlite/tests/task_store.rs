//! SqliteTaskStore behaviour against real SQLite databases.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rstest::rstest;
use tempfile::TempDir;

use shuttle_core::StoreError;
use shuttle_core::domain::{ConversationMemory, Message, Task, TaskId, TaskStatus, TaskType};
use shuttle_core::ports::TaskStore;
use shuttle_sqlite::SqliteTaskStore;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
}

fn task(id: &str, priority: i32, created_secs: i64) -> Task {
    let mut task = Task::new("user-1", "session-1", TaskType::new("chat"), "hello")
        .with_id(id)
        .with_priority(priority)
        .with_tools(["search", "calendar"])
        .with_context("locale", serde_json::json!("en"));
    task.created_at = at(created_secs);
    task.updated_at = at(created_secs);
    task
}

async fn create_test_store() -> (SqliteTaskStore, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = SqliteTaskStore::open(temp_dir.path().join("tasks.db"))
        .await
        .expect("Failed to open store");
    (store, temp_dir)
}

#[tokio::test]
async fn test_create_and_read_task() {
    let (store, _temp) = create_test_store().await;
    let original = task("t1", 3, 0);

    store.create_task(&original).await.unwrap();
    let read = store.get_task(&original.id).await.unwrap().unwrap();

    assert_eq!(read, original);
    assert!(store.get_task(&TaskId::new("missing")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_create_conflicts() {
    let store = SqliteTaskStore::in_memory().await.unwrap();
    store.create_task(&task("t1", 0, 0)).await.unwrap();

    let err = store.create_task(&task("t1", 0, 0)).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(id) if id.as_str() == "t1"));
}

#[tokio::test]
async fn test_pending_order_and_limit() {
    let store = SqliteTaskStore::in_memory().await.unwrap();
    store.create_task(&task("low", 1, 0)).await.unwrap();
    store.create_task(&task("high-late", 9, 20)).await.unwrap();
    store.create_task(&task("high-early", 9, 10)).await.unwrap();
    store.create_task(&task("mid", 5, 5)).await.unwrap();
    store
        .update_status(&TaskId::new("mid"), TaskStatus::Running, at(30))
        .await
        .unwrap();

    let ids: Vec<String> = store
        .get_pending_tasks(10)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id.to_string())
        .collect();
    assert_eq!(ids, vec!["high-early", "high-late", "low"]);

    assert_eq!(store.get_pending_tasks(2).await.unwrap().len(), 2);
}

#[rstest]
#[case::pending_to_running(TaskStatus::Pending, TaskStatus::Running, true)]
#[case::pending_to_completed(TaskStatus::Pending, TaskStatus::Completed, false)]
#[case::running_to_failed(TaskStatus::Running, TaskStatus::Failed, true)]
#[case::running_to_running(TaskStatus::Running, TaskStatus::Running, false)]
#[case::completed_to_running(TaskStatus::Completed, TaskStatus::Running, false)]
#[case::back_to_pending(TaskStatus::Running, TaskStatus::Pending, false)]
#[tokio::test]
async fn test_conditional_status_update(
    #[case] from: TaskStatus,
    #[case] to: TaskStatus,
    #[case] applied: bool,
) {
    let store = SqliteTaskStore::in_memory().await.unwrap();
    let mut t = task("t1", 0, 0);
    t.status = from;
    store.create_task(&t).await.unwrap();

    assert_eq!(store.update_status(&t.id, to, at(60)).await.unwrap(), applied);

    let expected = if applied { to } else { from };
    assert_eq!(store.get_task(&t.id).await.unwrap().unwrap().status, expected);
}

#[tokio::test]
async fn test_complete_and_fail_store_results() {
    let store = SqliteTaskStore::in_memory().await.unwrap();
    for id in ["ok", "bad"] {
        store.create_task(&task(id, 0, 0)).await.unwrap();
        store
            .update_status(&TaskId::new(id), TaskStatus::Running, at(1))
            .await
            .unwrap();
    }

    assert!(store.complete_task(&TaskId::new("ok"), "answer", at(2)).await.unwrap());
    assert!(store.fail_task(&TaskId::new("bad"), "timeout", at(3)).await.unwrap());
    // terminal records stay put
    assert!(!store.fail_task(&TaskId::new("ok"), "late", at(4)).await.unwrap());

    let ok = store.get_task(&TaskId::new("ok")).await.unwrap().unwrap();
    assert_eq!(ok.status, TaskStatus::Completed);
    assert_eq!(ok.output.as_deref(), Some("answer"));
    assert_eq!(ok.error, None);
    assert_eq!(ok.completed_at, Some(at(2)));
    assert_eq!(ok.updated_at, at(2));

    let bad = store.get_task(&TaskId::new("bad")).await.unwrap().unwrap();
    assert_eq!(bad.status, TaskStatus::Failed);
    assert_eq!(bad.error.as_deref(), Some("timeout"));
    assert_eq!(bad.completed_at, Some(at(3)));
}

#[tokio::test]
async fn test_prune_terminal_tasks() {
    let store = SqliteTaskStore::in_memory().await.unwrap();
    for id in ["old", "new", "waiting"] {
        store.create_task(&task(id, 0, 0)).await.unwrap();
    }
    for (id, finished) in [("old", at(10)), ("new", at(1000))] {
        let id = TaskId::new(id);
        store.update_status(&id, TaskStatus::Running, finished).await.unwrap();
        store.complete_task(&id, "done", finished).await.unwrap();
    }

    assert_eq!(store.prune_terminal_tasks(at(500)).await.unwrap(), 1);
    assert!(store.get_task(&TaskId::new("old")).await.unwrap().is_none());
    assert!(store.get_task(&TaskId::new("new")).await.unwrap().is_some());
    assert!(store.get_task(&TaskId::new("waiting")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_stale_running_tasks() {
    let store = SqliteTaskStore::in_memory().await.unwrap();
    for id in ["stuck", "busy", "waiting"] {
        store.create_task(&task(id, 0, 0)).await.unwrap();
    }
    store
        .update_status(&TaskId::new("stuck"), TaskStatus::Running, at(10))
        .await
        .unwrap();
    store
        .update_status(&TaskId::new("busy"), TaskStatus::Running, at(600))
        .await
        .unwrap();

    let stale = store.get_stale_running_tasks(at(300), 10).await.unwrap();

    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id.as_str(), "stuck");
    assert_eq!(stale[0].status, TaskStatus::Running);
}

#[tokio::test]
async fn test_conversation_memory_upsert() {
    let store = SqliteTaskStore::in_memory().await.unwrap();
    let mut memory = ConversationMemory {
        session_id: "session-1".into(),
        user_id: "user-1".into(),
        messages: vec![Message {
            role: "user".into(),
            content: "hi".into(),
            timestamp: at(0),
        }],
        summary: None,
        updated_at: at(0),
    };
    store.save_conversation_memory(&memory).await.unwrap();

    memory.summary = Some("said hi".into());
    memory.updated_at = at(5);
    store.save_conversation_memory(&memory).await.unwrap();

    let read = store.conversation_memory("session-1").await.unwrap();
    assert_eq!(read, Some(memory));
    assert!(store.conversation_memory("other").await.unwrap().is_none());
}

#[tokio::test]
async fn test_reopen_keeps_records() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tasks.db");
    {
        let store = SqliteTaskStore::open(&path).await.unwrap();
        store.create_task(&task("t1", 0, 0)).await.unwrap();
        store.ping().await.unwrap();
    }

    let store = SqliteTaskStore::open(&path).await.unwrap();
    assert_eq!(store.get_pending_tasks(10).await.unwrap().len(), 1);
}
