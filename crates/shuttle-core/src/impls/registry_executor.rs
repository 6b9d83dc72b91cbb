//! Executor that dispatches to in-process handlers by task type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ExecutionResult, Task, TaskType};
use crate::error::ExecutorError;
use crate::ports::Executor;

/// A handler for a specific task type.
///
/// Takes the whole `Task` so the handler can read input, context and tools
/// as it likes.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<ExecutionResult, ExecutorError>;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate handler for task_type={0}")]
    DuplicateHandler(TaskType),
}

/// Registry of handlers (task_type -> handler).
///
/// Built during initialization (mutable), then shared read-only, so lookups
/// need no lock.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), RegistryError> {
        if self.handlers.contains_key(&task_type) {
            return Err(RegistryError::DuplicateHandler(task_type));
        }
        self.handlers.insert(task_type, handler);
        Ok(())
    }

    pub fn get(&self, task_type: &TaskType) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(task_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

pub struct RegistryExecutor {
    registry: Arc<HandlerRegistry>,
}

impl RegistryExecutor {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }
}

#[async_trait]
impl Executor for RegistryExecutor {
    async fn execute(&self, task: &Task) -> Result<ExecutionResult, ExecutorError> {
        let handler = self
            .registry
            .get(&task.task_type)
            .ok_or_else(|| ExecutorError::HandlerNotFound(task.task_type.clone()))?;

        handler.handle(task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn handle(&self, task: &Task) -> Result<ExecutionResult, ExecutorError> {
            Ok(ExecutionResult::success(task.input.clone()))
        }
    }

    fn task(task_type: &str) -> Task {
        Task::new("u", "s", TaskType::new(task_type), "ping")
    }

    #[tokio::test]
    async fn executes_registered_handler() {
        let mut reg = HandlerRegistry::new();
        reg.register(TaskType::new("echo"), Arc::new(EchoHandler))
            .unwrap();

        let executor = RegistryExecutor::new(Arc::new(reg));

        let result = executor.execute(&task("echo")).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.output, "ping");
    }

    #[tokio::test]
    async fn errors_when_handler_missing() {
        let executor = RegistryExecutor::new(Arc::new(HandlerRegistry::new()));

        let err = executor.execute(&task("missing")).await.unwrap_err();
        assert!(err.to_string().contains("handler"));
    }

    #[test]
    fn rejects_duplicate_registration() {
        let mut reg = HandlerRegistry::new();
        reg.register(TaskType::new("echo"), Arc::new(EchoHandler))
            .unwrap();
        let err = reg
            .register(TaskType::new("echo"), Arc::new(EchoHandler))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateHandler(TaskType::new("echo")));
        assert_eq!(reg.len(), 1);
    }
}
