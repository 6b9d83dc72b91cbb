//! Task lifecycle notifications published to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::TaskId;

/// Pub/sub channel that carries `TaskEvent`s.
pub const TASK_EVENTS_CHANNEL: &str = "task_events";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskEventKind {
    #[serde(rename = "task.completed")]
    Completed,
    #[serde(rename = "task.failed")]
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    #[serde(rename = "type")]
    pub kind: TaskEventKind,
    pub task_id: TaskId,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl TaskEvent {
    pub fn completed(task_id: TaskId, output: &str, duration: Duration, at: DateTime<Utc>) -> Self {
        Self {
            kind: TaskEventKind::Completed,
            task_id,
            timestamp: at,
            data: serde_json::json!({
                "output": output,
                "duration_ms": duration.as_millis() as u64,
            }),
        }
    }

    pub fn failed(task_id: TaskId, error: &str, duration: Duration, at: DateTime<Utc>) -> Self {
        Self {
            kind: TaskEventKind::Failed,
            task_id,
            timestamp: at,
            data: serde_json::json!({
                "error": error,
                "duration_ms": duration.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_event_wire_shape() {
        let event = TaskEvent::failed(
            TaskId::new("t1"),
            "boom",
            Duration::from_millis(42),
            Utc::now(),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "task.failed");
        assert_eq!(value["task_id"], "t1");
        assert_eq!(value["data"]["error"], "boom");
        assert_eq!(value["data"]["duration_ms"], 42);
    }
}
