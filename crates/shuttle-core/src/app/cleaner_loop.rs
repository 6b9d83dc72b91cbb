//! Cleaner - periodic housekeeping.
//!
//! Logs fast-path queue depth and prunes terminal tasks older than the
//! retention window. Runs on its own task, so a slow prune never holds up
//! workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::delivery::TaskQueue;
use crate::domain::Lane;
use crate::ports::{Clock, TaskStore};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanReport {
    /// `None` when the ephemeral store could not be asked.
    pub queue_lengths: Option<Vec<(Lane, usize)>>,
    pub pruned: u64,
}

pub struct Cleaner {
    queue: TaskQueue,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    retention: Option<chrono::Duration>,
}

impl Cleaner {
    pub fn new(
        queue: TaskQueue,
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        retention: Option<chrono::Duration>,
    ) -> Self {
        Self {
            queue,
            store,
            clock,
            interval,
            retention,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        // first pass one interval after start
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {}
            }
            // a hung store call must not hold up shutdown
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = self.clean_once() => {}
            }
        }
    }

    pub async fn clean_once(&self) -> CleanReport {
        let mut report = CleanReport::default();

        match self.queue.lengths().await {
            Ok(lengths) => {
                for (lane, len) in &lengths {
                    info!(%lane, len, "queue depth");
                }
                report.queue_lengths = Some(lengths);
            }
            Err(err) => warn!(error = %err, "cleaner could not read queue depth"),
        }

        if let Some(retention) = self.retention {
            let cutoff = self.clock.now() - retention;
            match self.store.prune_terminal_tasks(cutoff).await {
                Ok(0) => {}
                Ok(pruned) => {
                    info!(pruned, %cutoff, "pruned finished tasks");
                    report.pruned = pruned;
                }
                Err(err) => warn!(error = %err, "failed to prune finished tasks"),
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::FlakyTaskStore;
    use crate::domain::{Task, TaskStatus, TaskType};
    use crate::impls::{InMemoryEphemeralStore, InMemoryTaskStore};
    use crate::ports::FixedClock;
    use chrono::Utc;

    #[tokio::test]
    async fn reports_depth_and_prunes_old_tasks() {
        let ephemeral = Arc::new(InMemoryEphemeralStore::new());
        let durable = Arc::new(InMemoryTaskStore::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let queue = TaskQueue::new(ephemeral, 5, Duration::from_secs(60));

        let task = Task::new("u", "s", TaskType::new("chat"), "hi").with_id("old");
        durable.create_task(&task).await.unwrap();
        let long_ago = Utc::now() - chrono::Duration::days(45);
        durable.update_status(&task.id, TaskStatus::Running, long_ago).await.unwrap();
        durable.complete_task(&task.id, "ok", long_ago).await.unwrap();
        queue.enqueue(&Task::new("u", "s", TaskType::new("chat"), "x").with_priority(9)).await.unwrap();

        let cleaner = Cleaner::new(
            queue,
            durable.clone(),
            clock,
            Duration::from_secs(3600),
            Some(chrono::Duration::days(30)),
        );
        let report = cleaner.clean_once().await;

        assert_eq!(report.pruned, 1);
        assert_eq!(report.queue_lengths, Some(vec![(Lane::High, 1), (Lane::Low, 0)]));
        assert_eq!(durable.len().await, 0);
    }

    #[tokio::test]
    async fn disabled_retention_keeps_everything() {
        let ephemeral = Arc::new(InMemoryEphemeralStore::new());
        let durable = Arc::new(InMemoryTaskStore::new());
        let task = Task::new("u", "s", TaskType::new("chat"), "hi");
        durable.create_task(&task).await.unwrap();
        let long_ago = Utc::now() - chrono::Duration::days(400);
        durable.update_status(&task.id, TaskStatus::Running, long_ago).await.unwrap();
        durable.fail_task(&task.id, "x", long_ago).await.unwrap();

        let cleaner = Cleaner::new(
            TaskQueue::new(ephemeral.clone(), 5, Duration::from_secs(60)),
            durable.clone(),
            Arc::new(FixedClock::new(Utc::now())),
            Duration::from_secs(3600),
            None,
        );
        ephemeral.set_available(false);
        let report = cleaner.clean_once().await;

        assert_eq!(report, CleanReport { queue_lengths: None, pruned: 0 });
        assert_eq!(durable.len().await, 1);
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_hung_prune() {
        let durable = Arc::new(FlakyTaskStore::new());
        durable.stall(true);
        let cleaner = Cleaner::new(
            TaskQueue::new(Arc::new(InMemoryEphemeralStore::new()), 5, Duration::from_secs(60)),
            durable,
            Arc::new(FixedClock::new(Utc::now())),
            Duration::from_millis(10),
            Some(chrono::Duration::days(30)),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(cleaner.run(shutdown_rx));

        // past the first tick, so the prune is in flight
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cleaner did not stop")
            .unwrap();
    }
}
