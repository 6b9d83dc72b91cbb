//! SchedulerBuilder - wiring and start-up validation.
//!
//! Fail-fast: every collaborator and the configuration are checked in
//! `build()`, so a misconfigured scheduler never gets as far as `start()`.

use std::sync::Arc;

use super::delivery::TaskQueue;
use super::lock::LockManager;
use super::scheduler::TaskScheduler;
use super::stats::StatsRecorder;
use super::worker_loop::WorkerContext;
use crate::config::{ConfigError, SchedulerConfig};
use crate::ports::{Clock, EphemeralStore, Executor, SystemClock, TaskStore};

/// # 使用例
/// ```ignore
/// let scheduler = TaskScheduler::builder()
///     .config(config)
///     .task_store(Arc::new(InMemoryTaskStore::new()))
///     .ephemeral_store(Arc::new(InMemoryEphemeralStore::new()))
///     .executor(Arc::new(RegistryExecutor::new(registry)))
///     .build()?;
/// scheduler.start()?;
/// ```
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    task_store: Option<Arc<dyn TaskStore>>,
    ephemeral_store: Option<Arc<dyn EphemeralStore>>,
    executor: Option<Arc<dyn Executor>>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no task store configured")]
    MissingTaskStore,

    #[error("no ephemeral store configured")]
    MissingEphemeralStore,

    #[error("no executor configured")]
    MissingExecutor,

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            task_store: None,
            ephemeral_store: None,
            executor: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    pub fn ephemeral_store(mut self, store: Arc<dyn EphemeralStore>) -> Self {
        self.ephemeral_store = Some(store);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<TaskScheduler, BuildError> {
        self.config.validate()?;
        let store = self.task_store.ok_or(BuildError::MissingTaskStore)?;
        let ephemeral = self
            .ephemeral_store
            .ok_or(BuildError::MissingEphemeralStore)?;
        let executor = self.executor.ok_or(BuildError::MissingExecutor)?;
        let config = self.config;

        let worker_ctx = WorkerContext {
            store: Arc::clone(&store),
            executor,
            clock: Arc::clone(&self.clock),
            queue: TaskQueue::new(
                Arc::clone(&ephemeral),
                config.high_priority_threshold,
                config.task_cache_ttl(),
            ),
            locks: LockManager::new(
                Arc::clone(&ephemeral),
                Arc::clone(&self.clock),
                config.lock_ttl(),
                config.lock_release,
            ),
            stats: StatsRecorder::new(
                Arc::clone(&ephemeral),
                Arc::clone(&self.clock),
                config.counter_ttl(),
            ),
        };

        Ok(TaskScheduler::from_parts(
            config, store, ephemeral, self.clock, worker_ctx,
        ))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
