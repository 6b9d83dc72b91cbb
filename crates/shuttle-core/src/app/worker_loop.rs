//! Worker - drains the dispatch channel and runs one task at a time.
//!
//! Per task:
//! 1. take the task lock; if someone else has it, walk away
//! 2. re-read the record and claim it: `pending -> running`, or a `running`
//!    record whose previous holder's lock has expired. Anything else, or a
//!    store error, means walk away and leave the record for a later delivery
//! 3. invoke the executor
//! 4. finalize: `completed` + memory, or `failed` + error; event; counters
//! 5. release the lock and drop the fast-path cache entry
//!
//! Failures are terminal. Nothing here is retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::delivery::TaskQueue;
use super::lock::{LockManager, stale_cutoff};
use super::stats::{Outcome, StatsRecorder};
use crate::domain::{ExecutionResult, Task, TaskEvent, TaskId, TaskStatus};
use crate::error::ExecutorError;
use crate::ports::{Clock, Executor, TaskStore};

/// Everything a worker needs, cheap to clone per worker.
#[derive(Clone)]
pub struct WorkerContext {
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) queue: TaskQueue,
    pub(crate) locks: LockManager,
    pub(crate) stats: StatsRecorder,
}

/// How a delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Failed,
    /// Another worker holds the lock.
    LockContended,
    /// Lock could not be attempted (store unreachable).
    LockUnavailable,
    /// The record could not be moved to `running`. It keeps its status and
    /// is picked up by a later delivery.
    NotClaimed,
    /// Stale duplicate: the task is already terminal or gone.
    AlreadyFinished,
}

/// Decrements the live-worker count however the loop exits.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Worker {
    id: usize,
    ctx: WorkerContext,
}

impl Worker {
    pub fn new(id: usize, ctx: WorkerContext) -> Self {
        Self { id, ctx }
    }

    pub async fn run(
        self,
        dispatch: flume::Receiver<Task>,
        mut shutdown_rx: watch::Receiver<bool>,
        live: Arc<AtomicUsize>,
    ) {
        let _live = LiveGuard::new(live);
        debug!(worker_id = self.id, "worker started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let task = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                task = dispatch.recv_async() => match task {
                    Ok(task) => task,
                    // channel closed and drained
                    Err(_) => break,
                },
            };

            // in-flight tasks are not cancelled; shutdown is observed on the next iteration
            self.process(task).await;
        }

        debug!(worker_id = self.id, "worker stopped");
    }

    pub async fn process(&self, task: Task) -> ProcessOutcome {
        let ctx = &self.ctx;
        let id = task.id.clone();

        let lock = match ctx.locks.acquire(&LockManager::task_key(&id)).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                debug!(worker_id = self.id, task_id = %id, "task locked by another worker");
                return ProcessOutcome::LockContended;
            }
            Err(err) => {
                warn!(worker_id = self.id, task_id = %id, error = %err, "failed to acquire task lock");
                return ProcessOutcome::LockUnavailable;
            }
        };

        let outcome = match self.claim(&id).await {
            Ok(claimed) => self.execute(claimed).await,
            Err(outcome) => outcome,
        };

        if let Err(err) = ctx.locks.release(&lock).await {
            warn!(worker_id = self.id, task_id = %id, error = %err, "failed to release task lock");
        }
        if let Err(err) = ctx.queue.evict(&id).await {
            debug!(worker_id = self.id, task_id = %id, error = %err, "failed to evict task cache");
        }

        outcome
    }

    /// Under the lock: make sure the durable record says `running` and that
    /// this worker moved it there (or took over from a dead holder).
    async fn claim(&self, id: &TaskId) -> Result<Task, ProcessOutcome> {
        let ctx = &self.ctx;
        let now = ctx.clock.now();

        let mut current = match ctx.store.get_task(id).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                debug!(worker_id = self.id, task_id = %id, "task no longer exists");
                return Err(ProcessOutcome::AlreadyFinished);
            }
            Err(err) => {
                warn!(worker_id = self.id, task_id = %id, error = %err, "failed to re-read task");
                return Err(ProcessOutcome::NotClaimed);
            }
        };

        match current.status {
            TaskStatus::Pending => {
                match ctx.store.update_status(id, TaskStatus::Running, now).await {
                    Ok(true) => {
                        current.status = TaskStatus::Running;
                        current.updated_at = now;
                        Ok(current)
                    }
                    Ok(false) => {
                        debug!(worker_id = self.id, task_id = %id, "running mark not applied");
                        Err(ProcessOutcome::NotClaimed)
                    }
                    Err(err) => {
                        warn!(worker_id = self.id, task_id = %id, error = %err, "failed to mark task running");
                        Err(ProcessOutcome::NotClaimed)
                    }
                }
            }
            TaskStatus::Running => {
                let abandoned = stale_cutoff(now, ctx.locks.default_ttl())
                    .is_some_and(|cutoff| current.updated_at < cutoff);
                if abandoned {
                    warn!(worker_id = self.id, task_id = %id, updated_at = %current.updated_at, "taking over task left running by a dead worker");
                    Ok(current)
                } else {
                    debug!(worker_id = self.id, task_id = %id, "task is running elsewhere");
                    Err(ProcessOutcome::NotClaimed)
                }
            }
            status => {
                debug!(worker_id = self.id, task_id = %id, %status, "duplicate delivery of finished task");
                Err(ProcessOutcome::AlreadyFinished)
            }
        }
    }

    async fn execute(&self, task: Task) -> ProcessOutcome {
        let started = Instant::now();
        let result = self.ctx.executor.execute(&task).await;
        let duration = started.elapsed();

        match classify(result) {
            Ok(result) => {
                self.finish_completed(&task, result, duration).await;
                ProcessOutcome::Completed
            }
            Err(error) => {
                self.finish_failed(&task, &error, duration).await;
                ProcessOutcome::Failed
            }
        }
    }

    async fn finish_completed(
        &self,
        task: &Task,
        result: ExecutionResult,
        duration: std::time::Duration,
    ) {
        let ctx = &self.ctx;
        let now = ctx.clock.now();

        match ctx.store.complete_task(&task.id, &result.output, now).await {
            Ok(true) => {}
            Ok(false) => warn!(worker_id = self.id, task_id = %task.id, "completion not applied"),
            Err(err) => warn!(worker_id = self.id, task_id = %task.id, error = %err, "failed to mark task completed"),
        }

        if let Some(memory) = &result.memory
            && let Err(err) = ctx.store.save_conversation_memory(memory).await
        {
            warn!(worker_id = self.id, task_id = %task.id, error = %err, "failed to save conversation memory");
        }

        ctx.stats
            .publish(&TaskEvent::completed(task.id.clone(), &result.output, duration, now))
            .await;
        ctx.stats.record(Outcome::Success).await;

        info!(
            worker_id = self.id,
            task_id = %task.id,
            duration_ms = duration.as_millis() as u64,
            "task completed"
        );
    }

    async fn finish_failed(&self, task: &Task, error: &str, duration: std::time::Duration) {
        let ctx = &self.ctx;
        let now = ctx.clock.now();

        match ctx.store.fail_task(&task.id, error, now).await {
            Ok(true) => {}
            Ok(false) => warn!(worker_id = self.id, task_id = %task.id, "failure not applied"),
            Err(err) => warn!(worker_id = self.id, task_id = %task.id, error = %err, "failed to mark task failed"),
        }

        ctx.stats
            .publish(&TaskEvent::failed(task.id.clone(), error, duration, now))
            .await;
        ctx.stats.record(Outcome::Failure).await;

        warn!(
            worker_id = self.id,
            task_id = %task.id,
            duration_ms = duration.as_millis() as u64,
            error,
            "task failed"
        );
    }
}

/// Transport errors and reported failures both end as an error string.
fn classify(result: Result<ExecutionResult, ExecutorError>) -> Result<ExecutionResult, String> {
    match result {
        Ok(result) if result.is_success() => Ok(result),
        Ok(result) => Err(result
            .error
            .unwrap_or_else(|| "executor reported failure".to_string())),
        Err(err) => Err(err.to_string()),
    }
}
