//! TaskStore port - the durable source of truth.
//!
//! Holds the authoritative task record (status, priority, timestamps) and
//! conversation memory. Everything the ephemeral store holds about a task
//! can be rebuilt from here; the reverse is not true.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ConversationMemory, Task, TaskId, TaskStatus};
use crate::error::StoreError;

/// Durable task storage.
///
/// # Status writes
/// `update_status`, `complete_task` and `fail_task` apply only when the
/// stored status can legally move to the new one
/// (`TaskStatus::can_transition_to`). They return `Ok(false)` when the write
/// was rejected or the task does not exist, so a stale worker can never move
/// a record backwards.
///
/// Reads must observe this process's preceding writes to the same record.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new record. Fails with `StoreError::Conflict` if the id exists.
    async fn create_task(&self, task: &Task) -> Result<(), StoreError>;

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// `running -> completed`, storing the output and completion time.
    async fn complete_task(
        &self,
        id: &TaskId,
        output: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// `running -> failed`, storing the error and completion time.
    async fn fail_task(&self, id: &TaskId, error: &str, at: DateTime<Utc>)
    -> Result<bool, StoreError>;

    /// Up to `limit` pending tasks, highest priority first, oldest first
    /// within a priority.
    async fn get_pending_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError>;

    /// Up to `limit` running tasks last updated before `updated_before`,
    /// oldest first. These are tasks whose worker went away mid-execution.
    async fn get_stale_running_tasks(
        &self,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError>;

    /// Upsert by session id.
    async fn save_conversation_memory(&self, memory: &ConversationMemory) -> Result<(), StoreError>;

    /// Delete terminal tasks completed before `before`. Returns how many went.
    async fn prune_terminal_tasks(&self, before: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
