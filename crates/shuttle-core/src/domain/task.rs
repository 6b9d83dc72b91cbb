use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::{Lane, TaskId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The unit of work.
///
/// The durable store owns the authoritative copy. Queue entries carry a
/// serialized snapshot taken at submission time, so workers always re-read
/// status from the durable store before acting on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "task_id")]
    pub id: TaskId,
    pub user_id: String,
    pub session_id: String,
    #[serde(rename = "agent_type")]
    pub task_type: TaskType,
    /// Opaque input, interpreted only by the executor.
    pub input: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub tools: Vec<String>,
    pub priority: i32,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// New pending task with a generated id and priority 0.
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        task_type: TaskType,
        input: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::generate(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            task_type,
            input: input.into(),
            context: HashMap::new(),
            tools: Vec::new(),
            priority: 0,
            status: TaskStatus::Pending,
            output: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn lane(&self, high_priority_threshold: i32) -> Lane {
        Lane::for_priority(self.priority, high_priority_threshold)
    }

    /// Reset everything the scheduler owns so the record enters the system
    /// as a fresh pending task stamped at `now`.
    pub(crate) fn reset_for_submission(&mut self, now: DateTime<Utc>) {
        if self.id.is_empty() {
            self.id = TaskId::generate();
        }
        self.status = TaskStatus::Pending;
        self.output = None;
        self.error = None;
        self.created_at = now;
        self.updated_at = now;
        self.completed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_reset_forces_pending() {
        let mut task = Task::new("u", "s", TaskType::new("chat"), "hi").with_id("");
        task.status = TaskStatus::Failed;
        task.error = Some("old".into());

        let now = Utc::now();
        task.reset_for_submission(now);

        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.error.is_none());
        assert!(task.id.as_str().starts_with("task-"));
        assert_eq!(task.created_at, now);
        assert_eq!(task.updated_at, now);
    }

    #[test]
    fn queue_entry_uses_wire_field_names() {
        let task = Task::new("u", "s", TaskType::new("chat"), "hi").with_id("t1");
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["task_id"], "t1");
        assert_eq!(value["agent_type"], "chat");
        assert_eq!(value["status"], "pending");
        assert!(value.get("completed_at").is_none());
    }
}
