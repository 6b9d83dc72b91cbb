//! Shared fixtures for app-layer unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::delivery::TaskQueue;
use super::lock::LockManager;
use super::stats::StatsRecorder;
use super::worker_loop::WorkerContext;
use crate::config::LockReleaseMode;
use crate::domain::{ConversationMemory, ExecutionResult, Task, TaskId, TaskStatus};
use crate::error::{ExecutorError, StoreError};
use crate::impls::{InMemoryEphemeralStore, InMemoryTaskStore};
use crate::ports::{Executor, FixedClock, TaskStore};

enum Script {
    Succeed,
    Fail(String),
    Unreachable,
}

/// Executor with a fixed behaviour that records what it was asked to run.
pub(crate) struct ScriptedExecutor {
    script: Script,
    memory: Option<ConversationMemory>,
    delay: Duration,
    calls: AtomicUsize,
    executed: Mutex<Vec<TaskId>>,
}

impl ScriptedExecutor {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            memory: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn succeeding() -> Self {
        Self::with_script(Script::Succeed)
    }

    pub(crate) fn failing(error: &str) -> Self {
        Self::with_script(Script::Fail(error.to_string()))
    }

    pub(crate) fn unreachable() -> Self {
        Self::with_script(Script::Unreachable)
    }

    pub(crate) fn with_memory(mut self, memory: ConversationMemory) -> Self {
        self.memory = Some(memory);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn executed(&self) -> Vec<TaskId> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, task: &Task) -> Result<ExecutionResult, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.executed.lock().unwrap().push(task.id.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.script {
            Script::Succeed => {
                let result = ExecutionResult::success(format!("echo: {}", task.input));
                Ok(match &self.memory {
                    Some(memory) => result.with_memory(memory.clone()),
                    None => result,
                })
            }
            Script::Fail(error) => Ok(ExecutionResult::failure(error.clone())),
            Script::Unreachable => Err(ExecutorError::Transport("connection refused".into())),
        }
    }
}

/// In-memory store that can fail status writes or hang on housekeeping calls.
pub(crate) struct FlakyTaskStore {
    inner: InMemoryTaskStore,
    failing_status_writes: AtomicUsize,
    stalled: AtomicBool,
}

impl FlakyTaskStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: InMemoryTaskStore::new(),
            failing_status_writes: AtomicUsize::new(0),
            stalled: AtomicBool::new(false),
        }
    }

    /// The next `n` calls to `update_status` fail with `Unavailable`.
    pub(crate) fn fail_status_writes(&self, n: usize) {
        self.failing_status_writes.store(n, Ordering::SeqCst);
    }

    /// `ping` and `prune_terminal_tasks` never return while stalled.
    pub(crate) fn stall(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub(crate) fn inner(&self) -> &InMemoryTaskStore {
        &self.inner
    }

    async fn wait_if_stalled(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl TaskStore for FlakyTaskStore {
    async fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        self.inner.create_task(task).await
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.inner.get_task(id).await
    }

    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let failing = self
            .failing_status_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError::Unavailable("status write timed out".into()));
        }
        self.inner.update_status(id, status, at).await
    }

    async fn complete_task(
        &self,
        id: &TaskId,
        output: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.complete_task(id, output, at).await
    }

    async fn fail_task(
        &self,
        id: &TaskId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.fail_task(id, error, at).await
    }

    async fn get_pending_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        self.inner.get_pending_tasks(limit).await
    }

    async fn get_stale_running_tasks(
        &self,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        self.inner.get_stale_running_tasks(updated_before, limit).await
    }

    async fn save_conversation_memory(&self, memory: &ConversationMemory) -> Result<(), StoreError> {
        self.inner.save_conversation_memory(memory).await
    }

    async fn prune_terminal_tasks(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        self.wait_if_stalled().await;
        self.inner.prune_terminal_tasks(before).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.wait_if_stalled().await;
        self.inner.ping().await
    }
}

pub(crate) fn worker_context(
    durable: Arc<dyn TaskStore>,
    ephemeral: Arc<InMemoryEphemeralStore>,
    executor: Arc<ScriptedExecutor>,
) -> WorkerContext {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    WorkerContext {
        store: durable,
        executor,
        clock: clock.clone(),
        queue: TaskQueue::new(ephemeral.clone(), 5, Duration::from_secs(3600)),
        locks: LockManager::new(
            ephemeral.clone(),
            clock.clone(),
            Duration::from_secs(300),
            LockReleaseMode::Unconditional,
        ),
        stats: StatsRecorder::new(ephemeral, clock, Duration::from_secs(25 * 3600)),
    }
}
