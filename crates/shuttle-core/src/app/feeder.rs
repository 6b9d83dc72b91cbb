//! Feeder - moves ready work into the dispatch channel.
//!
//! Each tick:
//! 1. pop one entry from the fast path (high lane, then low)
//! 2. on a miss (empty or unreachable) read a batch of pending tasks from
//!    the durable store, topped up with running tasks whose lock must have
//!    expired (their worker died mid-execution)
//! 3. offer each task to the dispatch channel without blocking
//!
//! A full channel never stalls the loop: a popped fast-path entry goes back
//! on its lane, a fallback task is skipped until a later tick finds it again.

use std::sync::Arc;
use std::time::Duration;

use flume::TrySendError;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::delivery::TaskQueue;
use super::lock::stale_cutoff;
use crate::domain::Task;
use crate::error::StoreError;
use crate::ports::{Clock, TaskStore};

/// What a single tick did. Mostly for tests and debug logs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedReport {
    pub fast_path: usize,
    pub fallback: usize,
    pub requeued: usize,
    pub skipped: usize,
    /// Stale running tasks found by the fallback poll.
    pub stale: usize,
}

pub struct Feeder {
    queue: TaskQueue,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    dispatch: flume::Sender<Task>,
    tick: Duration,
    pop_timeout: Duration,
    fallback_batch: usize,
    stale_after: Duration,
}

impl Feeder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: TaskQueue,
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        dispatch: flume::Sender<Task>,
        tick: Duration,
        pop_timeout: Duration,
        fallback_batch: usize,
        stale_after: Duration,
    ) -> Self {
        Self {
            queue,
            store,
            clock,
            dispatch,
            tick,
            pop_timeout,
            fallback_batch,
            stale_after,
        }
    }

    /// Run until shutdown. Dropping `self` at the end closes the dispatch
    /// channel's producer side.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            // The value only ever flips to true (or the sender goes away),
            // so any change means stop.
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {}
            }

            let report = tokio::select! {
                _ = shutdown_rx.changed() => break,
                report = self.feed_once() => report,
            };
            if report != FeedReport::default() {
                debug!(?report, "feeder tick");
            }
        }

        info!("feeder stopped");
    }

    pub async fn feed_once(&self) -> FeedReport {
        let mut report = FeedReport::default();

        match self.queue.dequeue(self.pop_timeout).await {
            Ok(Some(task)) => {
                self.offer_fast_path(task, &mut report).await;
                return report;
            }
            Ok(None) => {}
            Err(StoreError::Serialization(err)) => {
                // 壊れたエントリは捨てる（durable 側から再発見される）
                warn!(error = %err, "dropping undecodable queue entry");
            }
            Err(err) => {
                debug!(error = %err, "fast path unavailable, falling back to durable store");
            }
        }

        let mut found = match self.store.get_pending_tasks(self.fallback_batch).await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "fallback poll failed");
                return report;
            }
        };

        let room = self.fallback_batch - found.len();
        if room > 0
            && let Some(cutoff) = stale_cutoff(self.clock.now(), self.stale_after)
        {
            match self.store.get_stale_running_tasks(cutoff, room).await {
                Ok(stale) => {
                    for task in &stale {
                        info!(task_id = %task.id, updated_at = %task.updated_at, "offering stale running task for reclaim");
                    }
                    report.stale = stale.len();
                    found.extend(stale);
                }
                Err(err) => warn!(error = %err, "stale running poll failed"),
            }
        }

        let total = found.len();
        for task in found {
            match self.dispatch.try_send(task) {
                Ok(()) => report.fallback += 1,
                Err(TrySendError::Full(task)) => {
                    debug!(task_id = %task.id, "dispatch channel full, skipping fallback task");
                    report.skipped = total - report.fallback;
                    break;
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
        report
    }

    async fn offer_fast_path(&self, task: Task, report: &mut FeedReport) {
        match self.dispatch.try_send(task) {
            Ok(()) => report.fast_path += 1,
            Err(TrySendError::Full(task)) => {
                debug!(task_id = %task.id, "dispatch channel full, re-enqueueing");
                match self.queue.requeue(&task).await {
                    Ok(_) => report.requeued += 1,
                    // still pending in the durable store; fallback will find it
                    Err(err) => warn!(task_id = %task.id, error = %err, "failed to re-enqueue task"),
                }
            }
            Err(TrySendError::Disconnected(task)) => {
                debug!(task_id = %task.id, "dispatch channel closed");
            }
        }
    }
}
