//! TaskScheduler - submission plus the coordinated lifecycle of the feeder,
//! workers, cleaner and health checker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::builder::SchedulerBuilder;
use super::cleaner_loop::Cleaner;
use super::feeder::Feeder;
use super::health_loop::{HealthChecker, HealthProbe, HealthReport};
use super::worker_loop::{Worker, WorkerContext};
use crate::config::SchedulerConfig;
use crate::domain::{Task, TaskId, TaskStats};
use crate::error::{SchedulerError, StoreError};
use crate::ports::{Clock, EphemeralStore, TaskStore};

/// Handles of one started generation of loops.
struct RunningLoops {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl RunningLoops {
    fn request_shutdown(&self) {
        // ignore send error: every loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                warn!(error = %err, "scheduler loop ended abnormally");
            }
        }
    }
}

pub struct TaskScheduler {
    config: SchedulerConfig,
    store: Arc<dyn TaskStore>,
    ephemeral: Arc<dyn EphemeralStore>,
    clock: Arc<dyn Clock>,
    worker_ctx: WorkerContext,
    live_workers: Arc<AtomicUsize>,
    health_tx: Arc<watch::Sender<HealthReport>>,
    /// Held by `stop` until every loop has been joined.
    running: Mutex<Option<RunningLoops>>,
}

impl TaskScheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn from_parts(
        config: SchedulerConfig,
        store: Arc<dyn TaskStore>,
        ephemeral: Arc<dyn EphemeralStore>,
        clock: Arc<dyn Clock>,
        worker_ctx: WorkerContext,
    ) -> Self {
        let (health_tx, _) = watch::channel(HealthReport::unknown());
        Self {
            config,
            store,
            ephemeral,
            clock,
            worker_ctx,
            live_workers: Arc::new(AtomicUsize::new(0)),
            health_tx: Arc::new(health_tx),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Launch the workers, the feeder, the cleaner and the health checker.
    ///
    /// Returns once everything is spawned. Every precondition is checked
    /// before the first spawn, so an error leaves nothing running.
    pub fn start(&self) -> Result<(), SchedulerError> {
        self.config.validate()?;
        let handle = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let Ok(mut running) = self.running.try_lock() else {
            return Err(SchedulerError::Stopping);
        };
        if running.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (dispatch_tx, dispatch_rx) = flume::bounded(self.config.channel_capacity);
        let mut joins = Vec::with_capacity(self.config.workers + 3);

        for worker_id in 0..self.config.workers {
            let worker = Worker::new(worker_id, self.worker_ctx.clone());
            joins.push(handle.spawn(worker.run(
                dispatch_rx.clone(),
                shutdown_rx.clone(),
                Arc::clone(&self.live_workers),
            )));
        }
        drop(dispatch_rx);

        let feeder = Feeder::new(
            self.worker_ctx.queue.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            dispatch_tx,
            self.config.feeder_tick(),
            self.config.pop_timeout(),
            self.config.fallback_batch,
            self.config.lock_ttl(),
        );
        joins.push(handle.spawn(feeder.run(shutdown_rx.clone())));

        let cleaner = Cleaner::new(
            self.worker_ctx.queue.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.config.cleaner_interval(),
            self.config.retention(),
        );
        joins.push(handle.spawn(cleaner.run(shutdown_rx.clone())));

        let checker = HealthChecker::new(
            self.probe(),
            self.config.health_interval(),
            Arc::clone(&self.health_tx),
        );
        joins.push(handle.spawn(checker.run(shutdown_rx)));

        *running = Some(RunningLoops { shutdown_tx, joins });
        info!(workers = self.config.workers, "scheduler started");
        Ok(())
    }

    /// Signal every loop to stop and wait for all of them.
    ///
    /// In-flight executor calls finish first. Safe to call repeatedly and
    /// before `start`; a call made while another is still joining waits for
    /// that join to finish. Tasks still buffered in the dispatch channel are
    /// dropped; they remain `pending` in the durable store.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(loops) = running.take() else {
            debug!("stop requested while not running");
            return;
        };
        loops.shutdown_and_join().await;
        info!("scheduler stopped");
    }

    /// `true` from a successful `start` until `stop` has joined every loop.
    pub fn is_running(&self) -> bool {
        match self.running.try_lock() {
            Ok(running) => running.is_some(),
            // a stop is in progress
            Err(_) => true,
        }
    }

    /// Accept a task.
    ///
    /// Status is forced to `pending` and timestamps to now. The durable write
    /// is the commit point: if it fails, so does the call. The fast-path
    /// enqueue afterwards is best-effort; if it fails the feeder's fallback
    /// poll still finds the task.
    pub async fn submit_task(&self, mut task: Task) -> Result<TaskId, SchedulerError> {
        task.reset_for_submission(self.clock.now());

        self.store
            .create_task(&task)
            .await
            .map_err(SchedulerError::Durable)?;

        match self.worker_ctx.queue.enqueue(&task).await {
            Ok(lane) => debug!(task_id = %task.id, %lane, "task enqueued"),
            Err(err) => warn!(task_id = %task.id, error = %err, "fast-path enqueue failed; relying on fallback"),
        }

        info!(task_id = %task.id, priority = task.priority, "task submitted");
        Ok(task.id)
    }

    pub async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.store.get_task(id).await
    }

    /// Counts for one UTC day; days with no activity read as zero.
    pub async fn get_task_stats(&self, date: NaiveDate) -> Result<TaskStats, StoreError> {
        self.worker_ctx.stats.task_stats(date).await
    }

    /// Counts for the current UTC day according to the scheduler's clock.
    pub async fn get_today_stats(&self) -> Result<TaskStats, StoreError> {
        self.get_task_stats(self.clock.today()).await
    }

    /// Latest report from the periodic health check.
    pub fn health(&self) -> HealthReport {
        self.health_tx.borrow().clone()
    }

    /// Check now and publish the result as the latest report.
    pub async fn check_health(&self) -> HealthReport {
        let report = self.probe().check().await;
        self.health_tx.send_replace(report.clone());
        report
    }

    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    fn probe(&self) -> HealthProbe {
        HealthProbe::new(
            Arc::clone(&self.store),
            Arc::clone(&self.ephemeral),
            Arc::clone(&self.clock),
            Arc::clone(&self.live_workers),
            self.config.workers,
        )
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        // can't join here; at least stop the loops from taking new work
        if let Some(loops) = self.running.get_mut().take() {
            loops.request_shutdown();
        }
    }
}
