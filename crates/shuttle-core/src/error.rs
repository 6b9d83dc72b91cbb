use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::{TaskId, TaskType};

/// Errors surfaced by store adapters (durable or ephemeral).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("task already exists: {0}")]
    Conflict(TaskId),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Transport-level executor failures.
///
/// A task the executor ran and judged failed is not an error here; that is
/// reported through `ExecutionResult`.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("handler not found for task_type={0}")]
    HandlerNotFound(TaskType),

    #[error("executor transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The commit point of a submission failed; the task does not exist.
    #[error("failed to persist task: {0}")]
    Durable(#[source] StoreError),

    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler is still stopping")]
    Stopping,

    #[error("no tokio runtime available to spawn scheduler loops")]
    NoRuntime,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
