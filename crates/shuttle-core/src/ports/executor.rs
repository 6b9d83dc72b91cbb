use async_trait::async_trait;

use crate::domain::{ExecutionResult, Task};
use crate::error::ExecutorError;

/// Opaque capability that actually runs a task.
///
/// `Err` means the call itself failed (unreachable, malformed reply, no
/// handler). A task that ran and failed comes back as `Ok` with
/// `ExecutionStatus::Failure`. Both end the task as `failed`.
///
/// The scheduler imposes no timeout; implementations that talk to remote
/// services should bound their own calls.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<ExecutionResult, ExecutorError>;
}
